//! 生レコード定義
//!
//! ダンプストリームから読み取った直後の、アドレス未解決のレコード群。
//! 相互参照はすべて生アドレス（u64）のまま保持し、解決はリンカが行います。

use crate::endian::ByteOrder;

/// レコードタグ
pub const TAG_OBJECT: u64 = 1;
pub const TAG_EOF: u64 = 3;
pub const TAG_STACK_ROOT: u64 = 4;
pub const TAG_DATA_ROOT: u64 = 5;
pub const TAG_OTHER_ROOT: u64 = 6;
pub const TAG_TYPE: u64 = 7;
pub const TAG_GOROUTINE: u64 = 8;
pub const TAG_STACK_FRAME: u64 = 9;
pub const TAG_PARAMS: u64 = 10;
pub const TAG_FINALIZER: u64 = 11;
pub const TAG_ITAB: u64 = 12;
pub const TAG_OS_THREAD: u64 = 13;
pub const TAG_MEM_STATS: u64 = 14;

/// フィールド種別
///
/// 型レコード内の各フィールドがどのようにポインタを含むかを表します。
/// レコード上の形は種別値によらず (kind, offset) の2varintで固定なので、
/// 未知の種別値はエラーにせず保持します。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// 単独のポインタ
    Ptr,
    /// 文字列ヘッダ（ポインタ + 長さ）
    String,
    /// スライスヘッダ（ポインタ + 長さ + 容量）
    Slice,
    /// 型付きインターフェース（itabワード + データワード）
    Iface,
    /// 空インターフェース（型ワード + データワード）
    Eface,
    /// 未知の種別値。ポインタ走査の対象にならない
    Unknown(u64),
}

impl FieldKind {
    /// varint値からフィールド種別を得る
    pub fn from_u64(v: u64) -> Self {
        match v {
            0 => FieldKind::Ptr,
            1 => FieldKind::String,
            2 => FieldKind::Slice,
            3 => FieldKind::Iface,
            4 => FieldKind::Eface,
            other => FieldKind::Unknown(other),
        }
    }
}

/// オブジェクト種別
///
/// 配列はペイロード全体を要素サイズ刻みで、チャネルはヘッダ領域を
/// 飛ばして走査します。ペイロード長は種別と無関係にレコードが持つため、
/// 未知の種別値もエラーにせず保持します（走査パスを持たない）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Plain,
    Array,
    Chan,
    /// 未知の種別値。走査パスを持たない
    Unknown(u64),
}

impl ObjectKind {
    /// varint値からオブジェクト種別を得る
    pub fn from_u64(v: u64) -> Self {
        match v {
            0 => ObjectKind::Plain,
            1 => ObjectKind::Array,
            2 => ObjectKind::Chan,
            other => ObjectKind::Unknown(other),
        }
    }
}

/// ポインタを含みうるフィールドの位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub kind: FieldKind,
    /// 型先頭からのバイトオフセット
    pub offset: u64,
}

/// ヒープオブジェクト（生）
#[derive(Debug, Clone)]
pub struct RawObject {
    pub addr: u64,
    /// 型レコードのアドレス。0は型不明（ポインタフィールド無しとして扱う）
    pub type_addr: u64,
    pub kind: ObjectKind,
    /// ペイロード。長さはサイズクラスのスロット長で、型サイズより大きいことがある
    pub data: Vec<u8>,
}

/// 型記述子（生）
#[derive(Debug, Clone)]
pub struct RawType {
    pub addr: u64,
    pub size: u64,
    /// 型名。一意とは限らない
    pub name: String,
    /// この型を持つefaceのデータワードがポインタかどうか
    pub eface_ptr: bool,
    /// オフセット昇順のフィールド列
    pub fields: Vec<Field>,
}

/// ゴルーチン（生）
#[derive(Debug, Clone)]
pub struct RawGoRoutine {
    pub addr: u64,
    pub tos_addr: u64,
    pub goid: u64,
    pub gopc: u64,
    pub status: u64,
    pub is_system: bool,
    pub is_background: bool,
    pub wait_since: u64,
    pub wait_reason: String,
    pub ctxt_addr: u64,
    pub m_addr: u64,
}

/// スタックフレーム（生）
#[derive(Debug, Clone)]
pub struct RawStackFrame {
    /// スタックポインタ
    pub addr: u64,
    /// 0がスタックトップ
    pub depth: u64,
    pub parent_addr: u64,
    pub entry: u64,
    pub pc: u64,
    pub name: String,
}

/// スタック変数からのルート（生）
#[derive(Debug, Clone, Copy)]
pub struct RawStackRoot {
    pub from_addr: u64,
    pub to_addr: u64,
    pub frame_addr: u64,
    pub depth: u64,
}

/// グローバル変数からのルート（生）
#[derive(Debug, Clone, Copy)]
pub struct RawDataRoot {
    pub from_addr: u64,
    pub to_addr: u64,
}

/// その他のルート（生）
#[derive(Debug, Clone)]
pub struct RawOtherRoot {
    pub description: String,
    pub to_addr: u64,
}

/// ファイナライザ（生）
#[derive(Debug, Clone, Copy)]
pub struct RawFinalizer {
    /// ファイナライザが設定されたオブジェクト
    pub obj: u64,
    /// 実行される関数（FuncVal*）
    pub fn_addr: u64,
    /// コードポインタ
    pub code: u64,
    /// 関数引数の型
    pub fint: u64,
    /// オブジェクトの型
    pub ot: u64,
}

/// itabエントリ（生）
///
/// 対応するインターフェースのデータワードがポインタかどうかを示します。
#[derive(Debug, Clone, Copy)]
pub struct RawItab {
    pub addr: u64,
    pub ptr: bool,
}

/// OSスレッド（生）
#[derive(Debug, Clone, Copy)]
pub struct RawOsThread {
    pub addr: u64,
    pub id: u64,
    pub proc_id: u64,
}

/// ダンプパラメータ
///
/// ペイロード解釈に必要なバイトオーダー・ポインタ幅などを持ちます。
/// レコードメタデータ自体はvarintなのでParamsの出現位置に制約はありません。
#[derive(Debug, Clone)]
pub struct Params {
    pub order: ByteOrder,
    pub ptr_size: u64,
    /// チャネルヘッダのバイト数
    pub h_chan_size: u64,
    pub heap_start: u64,
    pub heap_end: u64,
    /// アーキテクチャタグ（コンパイラの1文字識別子）
    pub arch_char: u8,
    /// ランタイム実験フラグ文字列
    pub experiment: String,
    pub ncpu: u64,
}

/// メモリ統計レコード
#[derive(Debug, Clone)]
pub struct MemStats {
    pub alloc: u64,
    pub total_alloc: u64,
    pub sys: u64,
    pub lookups: u64,
    pub mallocs: u64,
    pub frees: u64,
    pub heap_alloc: u64,
    pub heap_sys: u64,
    pub heap_idle: u64,
    pub heap_inuse: u64,
    pub heap_released: u64,
    pub heap_objects: u64,
    pub stack_inuse: u64,
    pub stack_sys: u64,
    pub mspan_inuse: u64,
    pub mspan_sys: u64,
    pub mcache_inuse: u64,
    pub mcache_sys: u64,
    pub buck_hash_sys: u64,
    pub gc_sys: u64,
    pub other_sys: u64,
    pub next_gc: u64,
    pub last_gc: u64,
    pub pause_total_ns: u64,
    /// 直近256回のGC停止時間の循環バッファ
    pub pause_ns: Box<[u64; 256]>,
    pub num_gc: u32,
}

/// 読み取り直後のダンプ全体
///
/// リーダーが構築し、リンカが消費します。
#[derive(Debug, Default)]
pub struct RawDump {
    /// ストリームにParamsレコードが無かった場合はNone
    pub params: Option<Params>,
    pub types: Vec<RawType>,
    pub objects: Vec<RawObject>,
    pub frames: Vec<RawStackFrame>,
    pub goroutines: Vec<RawGoRoutine>,
    pub stack_roots: Vec<RawStackRoot>,
    pub data_roots: Vec<RawDataRoot>,
    pub other_roots: Vec<RawOtherRoot>,
    pub finalizers: Vec<RawFinalizer>,
    pub itabs: Vec<RawItab>,
    pub os_threads: Vec<RawOsThread>,
    pub mem_stats: Option<MemStats>,
}
