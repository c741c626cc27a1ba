//! Kaede 実行ファイルデバッグ情報解析
//!
//! このクレートは、ダンプ元の実行ファイル（ELF / Mach-O / PE）から
//! DWARFデバッグ情報を読み込み、グローバル変数の (名前, アドレス) 表を
//! 構築する機能を提供します。

pub mod globals;
pub mod loader;

pub use globals::{Global, GlobalTable};
pub use loader::ExeLoader;

use std::path::PathBuf;
use thiserror::Error;

/// 実行ファイルからデバッグ情報が得られなかった
///
/// 既知のコンテナ形式として解析できないか、デバッグ情報セクションが
/// 空の場合に返されます。グローバル名の解決にのみ致命的で、呼び出し側の
/// 設定によっては匿名グローバルへの縮退が可能です。
#[derive(Debug, Error)]
#[error("no debug info in executable {path:?}")]
pub struct NoDebugInfo {
    pub path: PathBuf,
}

/// デバッグ情報解析の結果型
pub type Result<T> = anyhow::Result<T>;
