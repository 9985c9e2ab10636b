//! Find the local account already linked to an external identity.

use rusqlite::Connection;

use thirdlogin_api::db as dbq;

use crate::storage::sq_query_row;

/// A local account as seen by login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub uid: String,
    pub name: String,
    pub username: String,
    pub destroyed: bool,
    pub has_avatar: bool,
}

/// Look up the account linked to `(provider, external_id)`.
///
/// Destroyed accounts are returned as-is; the caller decides what to do.
pub fn find_linked(
    conn: &Connection,
    provider: &str,
    external_id: &str,
) -> rusqlite::Result<Option<Account>> {
    let found = sq_query_row(
        conn,
        dbq::oauth::find_linked_account(provider, external_id),
        |row| {
            Ok(Account {
                uid: row.get(0)?,
                name: row.get(1)?,
                username: row.get(2)?,
                destroyed: row.get::<_, i64>(3)? != 0,
                has_avatar: row.get::<_, i64>(4)? != 0,
            })
        },
    );
    match found {
        Ok(account) => Ok(Some(account)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::sq_execute;
    use crate::storage::test_support::test_db;

    fn seed(conn: &Connection, uid: &str, provider: &str, external_id: &str) {
        sq_execute(
            conn,
            dbq::users::insert_account(&dbq::users::NewAccount {
                uid,
                name: "Octo",
                username: "octo",
                email: None,
                device_flag: 0,
                has_avatar: true,
            }),
        )
        .unwrap();
        sq_execute(
            conn,
            dbq::oauth::insert_identity(&dbq::oauth::NewIdentity {
                provider,
                external_id,
                uid,
                username: "octo",
                display_name: "Octo",
                avatar_url: None,
                email: None,
            }),
        )
        .unwrap();
    }

    #[test]
    fn finds_linked_account() {
        let t = test_db();
        let conn = t.db.conn();
        seed(&conn, "u1", "gitee", "octo");

        let account = find_linked(&conn, "gitee", "octo").unwrap().unwrap();
        assert_eq!(account.uid, "u1");
        assert!(account.has_avatar);
        assert!(!account.destroyed);
    }

    #[test]
    fn identity_is_scoped_by_provider() {
        let t = test_db();
        let conn = t.db.conn();
        seed(&conn, "u1", "gitee", "octo");

        assert_eq!(find_linked(&conn, "github", "octo").unwrap(), None);
        assert_eq!(find_linked(&conn, "gitee", "other").unwrap(), None);
    }

    #[test]
    fn destroyed_account_is_still_found() {
        let t = test_db();
        let conn = t.db.conn();
        seed(&conn, "u1", "gitee", "octo");
        sq_execute(&conn, dbq::users::mark_destroyed("u1")).unwrap();

        let account = find_linked(&conn, "gitee", "octo").unwrap().unwrap();
        assert!(account.destroyed);
    }
}
