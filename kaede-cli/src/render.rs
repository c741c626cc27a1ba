//! オブジェクト内容の表示整形
//!
//! 型のフィールド記述子に従ってペイロードを解釈し、1フィールド1行の
//! 表形式データに変換します。リンク済みエッジはfrom_offset順なので、
//! 先頭から突き合わせて参照先の表示に使います。

use kaede_core::{Dump, Edge, Field, FieldKind};

/// 表示用の1フィールド
#[derive(Debug, Clone)]
pub struct FieldRow {
    pub name: String,
    pub typ: String,
    pub value: String,
}

/// ペイロードをフィールド表に変換する
pub fn object_fields(d: &Dump, data: &[u8], fields: &[Field], edges: &[Edge]) -> Vec<FieldRow> {
    let words = d.words();
    let ptr = words.ptr_size();
    let mut rows = Vec::new();
    let mut rest = edges;
    let mut off = 0u64;

    for f in fields {
        if f.offset > off {
            rows.push(FieldRow {
                name: "pad".to_string(),
                typ: String::new(),
                value: format!("{} bytes", f.offset - off),
            });
            off = f.offset;
        }
        let name = format!("+{}", off);
        let (typ, value, width) = match f.kind {
            FieldKind::Ptr => {
                let value = pointer_cell(d, data, off, &mut rest);
                ("ptr", value, ptr)
            }
            FieldKind::String => {
                let head = pointer_cell(d, data, off, &mut rest);
                let len = word_cell(d, data, off + ptr);
                ("string", format!("{}/{}", head, len), 2 * ptr)
            }
            FieldKind::Slice => {
                let head = pointer_cell(d, data, off, &mut rest);
                let len = word_cell(d, data, off + ptr);
                let cap = word_cell(d, data, off + 2 * ptr);
                ("slice", format!("{}/{}/{}", head, len, cap), 3 * ptr)
            }
            FieldKind::Iface => {
                let value = pointer_cell(d, data, off + ptr, &mut rest);
                ("interface{...}", value, 2 * ptr)
            }
            FieldKind::Eface => {
                let value = pointer_cell(d, data, off + ptr, &mut rest);
                ("interface{}", value, 2 * ptr)
            }
            // 幅が不明なので消費せず、残りはpad行が引き受ける
            FieldKind::Unknown(v) => ("unknown", format!("kind {}", v), 0),
        };
        rows.push(FieldRow {
            name,
            typ: typ.to_string(),
            value,
        });
        off += width;
    }

    if data.len() as u64 > off {
        rows.push(FieldRow {
            name: "sizeclass pad".to_string(),
            typ: String::new(),
            value: format!("{} bytes", data.len() as u64 - off),
        });
    }
    rows
}

/// エッジの参照先表示
pub fn edge_target(d: &Dump, e: &Edge) -> String {
    let addr = match d.addr(e.to) {
        Ok(a) => format!("{:x}", a),
        Err(_) => "?".to_string(),
    };
    if e.to_offset != 0 {
        format!("object {}+{} (id {})", addr, e.to_offset, e.to)
    } else {
        format!("object {} (id {})", addr, e.to)
    }
}

/// バイト列のダンプ表示（16進と印字可能文字）
pub fn raw_bytes(b: &[u8]) -> String {
    let mut hex = String::new();
    let mut text = String::new();
    for &c in b {
        hex.push_str(&format!("{:02x} ", c));
        if c <= 32 || c >= 127 {
            text.push('.');
        } else {
            text.push(c as char);
        }
    }
    format!("{}| {}", hex, text)
}

/// ポインタ位置のセル表示
///
/// 次のエッジがこのオフセット由来ならその参照先を、そうでなければ
/// ヒープ外ポインタ（またはnil）として表示します。
fn pointer_cell(d: &Dump, data: &[u8], off: u64, rest: &mut &[Edge]) -> String {
    if let Some(e) = rest.first() {
        if e.from_offset == off {
            let s = edge_target(d, e);
            *rest = &rest[1..];
            return s;
        }
    }
    match word_at(d, data, off) {
        Some(0) => "nil".to_string(),
        Some(p) => format!("outside-heap {:x}", p),
        None => "<truncated>".to_string(),
    }
}

/// ワード値のセル表示
fn word_cell(d: &Dump, data: &[u8], off: u64) -> String {
    match word_at(d, data, off) {
        Some(v) => v.to_string(),
        None => "?".to_string(),
    }
}

/// オフセット位置のネイティブ幅ワードを読む
fn word_at(d: &Dump, data: &[u8], off: u64) -> Option<u64> {
    let tail = data.get(off as usize..)?;
    d.words().read_ptr(tail).ok()
}
