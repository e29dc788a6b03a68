//! 服务端函数
//!
//! 目前只有 `match-phone-contacts`：校验调用者凭证后，在用户目录中按手机号哈希查找已注册用户。

pub mod db;
pub mod directory;
pub mod match_phone_contacts;
pub mod verifier;

pub use directory::{ContactDirectory, SqliteContactDirectory};
pub use match_phone_contacts::{router, ContactMatchError, MatchState};
pub use verifier::{RemoteTokenVerifier, TokenVerifier};
