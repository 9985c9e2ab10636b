//! Linked identity query builders.

use sea_query::{Asterisk, Expr, Func, Query, SqliteQueryBuilder};

use super::Built;
use super::tables::{LinkedIdentities, Users};

/// Denormalized profile fields stored with a linked identity.
pub struct NewIdentity<'a> {
    pub provider: &'a str,
    pub external_id: &'a str,
    pub uid: &'a str,
    pub username: &'a str,
    pub display_name: &'a str,
    pub avatar_url: Option<&'a str>,
    pub email: Option<&'a str>,
}

/// Insert a linked identity.
///
/// Plain INSERT: a second link for the same `(provider, external_id)` must
/// fail on the unique constraint rather than silently update.
pub fn insert_identity(identity: &NewIdentity<'_>) -> Built {
    Query::insert()
        .into_table(LinkedIdentities::Table)
        .columns([
            LinkedIdentities::Provider,
            LinkedIdentities::ExternalId,
            LinkedIdentities::UserId,
            LinkedIdentities::Username,
            LinkedIdentities::DisplayName,
            LinkedIdentities::AvatarUrl,
            LinkedIdentities::Email,
        ])
        .values_panic([
            identity.provider.into(),
            identity.external_id.into(),
            identity.uid.into(),
            identity.username.into(),
            identity.display_name.into(),
            identity.avatar_url.map(|s| s.to_string()).into(),
            identity.email.map(|s| s.to_string()).into(),
        ])
        .build(SqliteQueryBuilder)
}

/// Find the account linked to an external identity.
///
/// Returns users.id, users.name, users.username, users.is_destroy, users.is_upload_avatar.
pub fn find_linked_account(provider: &str, external_id: &str) -> Built {
    Query::select()
        .column((Users::Table, Users::Id))
        .column((Users::Table, Users::Name))
        .column((Users::Table, Users::Username))
        .column((Users::Table, Users::IsDestroy))
        .column((Users::Table, Users::IsUploadAvatar))
        .from(LinkedIdentities::Table)
        .inner_join(
            Users::Table,
            Expr::col((Users::Table, Users::Id))
                .equals((LinkedIdentities::Table, LinkedIdentities::UserId)),
        )
        .and_where(Expr::col((LinkedIdentities::Table, LinkedIdentities::Provider)).eq(provider))
        .and_where(
            Expr::col((LinkedIdentities::Table, LinkedIdentities::ExternalId)).eq(external_id),
        )
        .build(SqliteQueryBuilder)
}

/// Count identities linked for `(provider, external_id)`.
pub fn count_identities(provider: &str, external_id: &str) -> Built {
    Query::select()
        .expr(Func::count(Expr::col(Asterisk)))
        .from(LinkedIdentities::Table)
        .and_where(Expr::col(LinkedIdentities::Provider).eq(provider))
        .and_where(Expr::col(LinkedIdentities::ExternalId).eq(external_id))
        .build(SqliteQueryBuilder)
}
