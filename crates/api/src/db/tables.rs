//! Compile-time–checked column identifiers for all tables.

use sea_query::Iden;

#[derive(Iden)]
pub enum Users {
    Table,
    Id,
    Name,
    Username,
    Email,
    DeviceFlag,
    IsDestroy,
    IsUploadAvatar,
    CreatedAt,
}

#[derive(Iden)]
pub enum LinkedIdentities {
    Table,
    Provider,
    ExternalId,
    UserId,
    Username,
    DisplayName,
    AvatarUrl,
    Email,
    CreatedAt,
}

#[derive(Iden)]
pub enum UserSettings {
    Table,
    UserId,
    NewMsgNotice,
    CreatedAt,
}

#[derive(Iden)]
pub enum RefreshTokens {
    Table,
    Id,
    UserId,
    TokenHash,
    ExpiresAt,
    CreatedAt,
}
