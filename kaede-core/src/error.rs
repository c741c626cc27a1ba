//! リンクと問い合わせのエラー種別

use thiserror::Error;

use crate::dump::ObjId;

/// アドレス解決（リンク）で発生するエラー
///
/// いずれもダンプの破損を示す致命的エラーです。ルートやファイナライザの
/// 解決失敗はエラーではなく、単に省略されます（解放済み・ヒープ外の
/// メモリを指すルートをモデル化するため）。
#[derive(Debug, Error)]
pub enum LinkError {
    /// オブジェクトが参照する型レコードが存在しない
    #[error("object type record missing for address {0:#x}")]
    MissingType(u64),

    /// efaceの型ワードが参照する型レコードが存在しない
    #[error("eface type record missing for address {0:#x}")]
    MissingEfaceType(u64),

    /// ifaceのitabワードが参照するitabレコードが存在しない
    #[error("itab record missing for address {0:#x}")]
    MissingItab(u64),

    /// ゴルーチンのスタックトップフレームが存在しない
    #[error("top-of-stack frame missing for goroutine {0:#x}")]
    OrphanGoroutine(u64),

    /// ゴルーチンの状態コードが既知の集合に含まれない
    ///
    /// 実行中を示すコード2はダンプ中に現れてはならない。
    #[error("invalid status code {status} for goroutine {goroutine:#x}")]
    InvalidGoroutineStatus { goroutine: u64, status: u64 },
}

/// 範囲外のオブジェクトIDによる問い合わせ
///
/// 問い合わせ境界で回復可能なエラーです。
#[derive(Debug, Error)]
#[error("unknown object id {0}")]
pub struct UnknownObject(pub ObjId);
