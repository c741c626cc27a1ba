//! ダンプフォーマットのエラー種別

use thiserror::Error;

/// ダンプストリーム解析で発生するエラー
///
/// いずれも読み込みの続行が不可能な致命的エラーです。
#[derive(Debug, Error)]
pub enum FormatError {
    /// 先頭行が既知のフォーマットヘッダと一致しない
    #[error("not a go1.3 heap dump file")]
    UnknownFormat,

    /// レコードの途中終端、不正なvarint、長さ超過など
    #[error("malformed dump: {0}")]
    Malformed(String),

    /// 未知のレコードタグ
    ///
    /// フォーマットはバージョン付きであり、レコードごとの長さ接頭辞が
    /// 無いため読み飛ばしはできない。
    #[error("unknown record tag {0}")]
    UnknownRecord(u64),

    /// ポインタサイズまたはバイトオーダーが既知の組に含まれない
    #[error("unsupported parameters: {0}")]
    UnsupportedParameters(String),
}
