//! Kaede ヒープダンプフォーマット読み取り
//!
//! このクレートは、Goランタイムが出力する `go1.3 heap dump` 形式の
//! バイナリストリームを解析し、アドレス未解決の生レコード群（RawDump）を
//! 構築します。オブジェクトペイロード内のワード読み取り機能も提供します。

pub mod endian;
pub mod error;
pub mod reader;
pub mod record;

pub use endian::{ByteOrder, WordReader};
pub use error::FormatError;
pub use reader::DumpReader;
pub use record::{
    Field, FieldKind, MemStats, ObjectKind, Params, RawDataRoot, RawDump, RawFinalizer,
    RawGoRoutine, RawItab, RawObject, RawOsThread, RawOtherRoot, RawStackFrame, RawStackRoot,
    RawType,
};

/// フォーマット解析の結果型
pub type Result<T> = anyhow::Result<T>;
