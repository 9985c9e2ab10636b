//! Account query builders.

use sea_query::{Asterisk, Expr, Func, Query, SqliteQueryBuilder};

use super::Built;
use super::tables::{RefreshTokens, UserSettings, Users};

// ── Account lookups ────────────────────────────────────────────────────────

/// Count all accounts.
pub fn count() -> Built {
    Query::select()
        .expr(Func::count(Expr::col(Asterisk)))
        .from(Users::Table)
        .build(SqliteQueryBuilder)
}

// ── Account creation ───────────────────────────────────────────────────────

/// Fields of a freshly provisioned account.
pub struct NewAccount<'a> {
    pub uid: &'a str,
    pub name: &'a str,
    pub username: &'a str,
    pub email: Option<&'a str>,
    pub device_flag: i64,
    pub has_avatar: bool,
}

/// Insert a third-party account (no password).
pub fn insert_account(account: &NewAccount<'_>) -> Built {
    Query::insert()
        .into_table(Users::Table)
        .columns([
            Users::Id,
            Users::Name,
            Users::Username,
            Users::Email,
            Users::DeviceFlag,
            Users::IsUploadAvatar,
        ])
        .values_panic([
            account.uid.into(),
            account.name.into(),
            account.username.into(),
            account.email.map(|s| s.to_string()).into(),
            account.device_flag.into(),
            i64::from(account.has_avatar).into(),
        ])
        .build(SqliteQueryBuilder)
}

/// Insert the default settings row that every account owns.
pub fn insert_settings(uid: &str) -> Built {
    Query::insert()
        .into_table(UserSettings::Table)
        .columns([UserSettings::UserId, UserSettings::NewMsgNotice])
        .values_panic([uid.into(), 1i64.into()])
        .build(SqliteQueryBuilder)
}

// ── Account lifecycle ──────────────────────────────────────────────────────

/// Flag an account as destroyed.
pub fn mark_destroyed(uid: &str) -> Built {
    Query::update()
        .table(Users::Table)
        .value(Users::IsDestroy, 1i64)
        .and_where(Expr::col(Users::Id).eq(uid))
        .build(SqliteQueryBuilder)
}

// ── Refresh tokens ─────────────────────────────────────────────────────────

/// Insert refresh token.
pub fn insert_refresh_token(id: &str, uid: &str, token_hash: &str, expires_at: &str) -> Built {
    Query::insert()
        .into_table(RefreshTokens::Table)
        .columns([
            RefreshTokens::Id,
            RefreshTokens::UserId,
            RefreshTokens::TokenHash,
            RefreshTokens::ExpiresAt,
        ])
        .values_panic([id.into(), uid.into(), token_hash.into(), expires_at.into()])
        .build(SqliteQueryBuilder)
}

/// Count refresh tokens issued to an account.
pub fn count_refresh_tokens(uid: &str) -> Built {
    Query::select()
        .expr(Func::count(Expr::col(Asterisk)))
        .from(RefreshTokens::Table)
        .and_where(Expr::col(RefreshTokens::UserId).eq(uid))
        .build(SqliteQueryBuilder)
}
