//! リンク済みヒープダンプのデータモデル
//!
//! オブジェクトグラフは本質的に循環するため、実体はすべてDumpが所有する
//! フラットなVecに置き、相互参照は密な整数ID（ObjId等）で表現します。
//! リンク完了後のDumpは不変で、複数スレッドから同期なしで参照できます。

use std::fmt;

use kaede_format::{
    Field, MemStats, ObjectKind, Params, RawFinalizer, RawItab, RawOsThread, WordReader,
};

use crate::error::UnknownObject;
use crate::graph::Indexes;

/// ヒープオブジェクトの識別子（読み取り順の密な連番）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjId(pub u32);

impl ObjId {
    /// 逆参照インデックスの空スロットを表す番兵値
    pub const NONE: ObjId = ObjId(u32::MAX);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ObjId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 型記述子の識別子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(pub u32);

impl TypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// スタックフレームの識別子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(pub u32);

impl FrameId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// ゴルーチンの識別子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GoIdx(pub u32);

impl GoIdx {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// 型記述子
#[derive(Debug, Clone)]
pub struct Type {
    /// ダンプ中の型レコードのアドレス
    pub addr: u64,
    /// 型名。一意とは限らない
    pub name: String,
    pub size: u64,
    /// この型を持つefaceのデータワードがポインタかどうか
    pub eface_ptr: bool,
    /// オフセット昇順のフィールド列（すべてoffset < size）
    pub fields: Vec<Field>,
}

/// オブジェクト間（またはルートからオブジェクトへ）の有向参照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub to: ObjId,
    /// 参照元ペイロード内でポインタが見つかったバイトオフセット
    pub from_offset: u64,
    /// 参照先ペイロード内でポインタが着地するバイトオフセット
    /// （オブジェクト内部を指す場合は非ゼロ）
    pub to_offset: u64,
    /// グローバルルート由来のエッジではグローバル変数名
    pub field_name: Option<String>,
}

/// ヒープオブジェクト
#[derive(Debug, Clone)]
pub struct Object {
    pub addr: u64,
    pub kind: ObjectKind,
    /// 型不明（型アドレス0）の場合はNone。ポインタフィールド無しとして扱う
    pub typ: Option<TypeId>,
    /// サイズクラスのスロット全体。型サイズより長いことがある
    pub data: Vec<u8>,
    /// from_offset順の出力エッジ（ファイナライザ由来のものは末尾）
    pub edges: Vec<Edge>,
}

/// ゴルーチンの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoStatus {
    Idle,
    Runnable,
    Syscall,
    Waiting,
    Dead,
}

impl GoStatus {
    /// ダンプ中の状態コードから状態を得る
    ///
    /// コード2（実行中）はダンプに現れてはならない。
    pub fn from_code(goroutine: u64, code: u64) -> Result<Self, crate::LinkError> {
        match code {
            0 => Ok(GoStatus::Idle),
            1 => Ok(GoStatus::Runnable),
            3 => Ok(GoStatus::Syscall),
            4 => Ok(GoStatus::Waiting),
            5 => Ok(GoStatus::Dead),
            status => Err(crate::LinkError::InvalidGoroutineStatus { goroutine, status }),
        }
    }
}

/// 停止中のゴルーチン
#[derive(Debug, Clone)]
pub struct GoRoutine {
    pub addr: u64,
    /// スタックトップ（深さ0）のフレーム
    pub tos: FrameId,
    pub status: GoStatus,
    pub wait_reason: String,
    /// コンテキストオブジェクト（ヒープ内に解決できた場合のみ）
    pub ctxt: Option<ObjId>,
    pub goid: u64,
    pub gopc: u64,
    pub is_system: bool,
    pub is_background: bool,
    pub wait_since: u64,
    pub m_addr: u64,
}

impl GoRoutine {
    /// 表示用の状態ラベルを取得する（Waitingでは待機理由）
    pub fn state_label(&self) -> &str {
        match self.status {
            GoStatus::Idle => "idle",
            GoStatus::Runnable => "runnable",
            GoStatus::Syscall => "syscall",
            GoStatus::Waiting => &self.wait_reason,
            GoStatus::Dead => "dead",
        }
    }
}

/// スタックフレーム（ひとつの活性化レコード）
#[derive(Debug, Clone)]
pub struct StackFrame {
    /// スタックポインタ
    pub addr: u64,
    /// 0がスタックトップ
    pub depth: u64,
    pub name: String,
    pub entry: u64,
    pub pc: u64,
    /// 呼び出し元フレーム。スタック底（通常はランタイムの脱出トランポリン）
    /// ではNone
    pub parent: Option<FrameId>,
    /// このフレームを持つゴルーチンへの逆参照
    pub goroutine: Option<GoIdx>,
    /// このフレームのローカルポインタスロットから解決されたエッジ
    pub edges: Vec<Edge>,
}

/// スタック変数からのルート
#[derive(Debug, Clone)]
pub struct StackRoot {
    pub frame: Option<FrameId>,
    /// 参照先がヒープ内に解決できなかった場合はNone
    pub edge: Option<Edge>,
}

/// グローバル変数からのルート
#[derive(Debug, Clone)]
pub struct DataRoot {
    /// 参照元を含むグローバル変数の名前
    pub name: String,
    pub edge: Option<Edge>,
}

/// その他のルート（ランタイム内部テーブル等）
#[derive(Debug, Clone)]
pub struct OtherRoot {
    pub description: String,
    pub edge: Option<Edge>,
}

/// リンク済みダンプ
///
/// リーダーとリンカだけが構築し、以後は不変です。
#[derive(Debug)]
pub struct Dump {
    pub params: Params,
    pub mem_stats: Option<MemStats>,
    pub types: Vec<Type>,
    pub objects: Vec<Object>,
    pub frames: Vec<StackFrame>,
    pub goroutines: Vec<GoRoutine>,
    pub stack_roots: Vec<StackRoot>,
    pub data_roots: Vec<DataRoot>,
    pub other_roots: Vec<OtherRoot>,
    pub finalizers: Vec<RawFinalizer>,
    pub itabs: Vec<RawItab>,
    pub os_threads: Vec<RawOsThread>,
    /// アドレス昇順に並べたObjId（ヒープ検索用）
    pub(crate) heap: Vec<ObjId>,
    /// 導出インデックス（型別ヒストグラムと逆エッジ表）
    pub(crate) idx: Indexes,
    /// ペイロード読み取り用のワードリーダー（paramsから構成済み）
    pub(crate) words: WordReader,
}

impl Dump {
    fn get(&self, id: ObjId) -> Result<&Object, UnknownObject> {
        self.objects.get(id.index()).ok_or(UnknownObject(id))
    }

    /// オブジェクトのヒープアドレス
    pub fn addr(&self, id: ObjId) -> Result<u64, UnknownObject> {
        Ok(self.get(id)?.addr)
    }

    /// オブジェクトのサイズ（サイズクラスのスロット長）
    pub fn size(&self, id: ObjId) -> Result<u64, UnknownObject> {
        Ok(self.get(id)?.data.len() as u64)
    }

    /// オブジェクトの型記述子（型不明ならNone）
    pub fn full_type(&self, id: ObjId) -> Result<Option<&Type>, UnknownObject> {
        Ok(self.get(id)?.typ.map(|t| &self.types[t.index()]))
    }

    /// オブジェクトの生ペイロード
    pub fn contents(&self, id: ObjId) -> Result<&[u8], UnknownObject> {
        Ok(&self.get(id)?.data)
    }

    /// オブジェクトの出力エッジ
    pub fn edges(&self, id: ObjId) -> Result<&[Edge], UnknownObject> {
        Ok(&self.get(id)?.edges)
    }

    /// オブジェクト数
    pub fn num_objects(&self) -> usize {
        self.objects.len()
    }

    /// アドレスpを含むオブジェクトを検索する
    pub fn find_containing(&self, p: u64) -> Option<ObjId> {
        find_containing(&self.objects, &self.heap, p)
    }

    /// ペイロード読み取り用のワードリーダーを取得する
    pub fn words(&self) -> WordReader {
        self.words
    }
}

/// アドレスpを範囲 [addr, addr+len(data)) に含むオブジェクトを返す
///
/// heapはアドレス昇順のObjId列。
pub(crate) fn find_containing(objects: &[Object], heap: &[ObjId], p: u64) -> Option<ObjId> {
    let j = heap.partition_point(|&id| {
        let o = &objects[id.index()];
        o.addr + o.data.len() as u64 <= p
    });
    if j < heap.len() && p >= objects[heap[j].index()].addr {
        Some(heap[j])
    } else {
        None
    }
}
