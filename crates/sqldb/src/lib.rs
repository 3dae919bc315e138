mod client;
mod codec;
mod crypto;
mod functions;

pub use client::{read_int, read_string_pairs, read_strings, Client, Location};
pub use codec::CodecKind;
pub use crypto::{Keyring, StaticKeyring};
pub use functions::install_functions;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to encode document blob")]
    Encode(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("failed to decode document blob")]
    Decode(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("data encryption key {dek_id:?} is not in the keyring")]
    UnknownKey { dek_id: String },
    #[error("failed to decrypt document blob under key {dek_id:?}")]
    Decrypt { dek_id: String },

    // rusqlite does a pretty good job of showing context in its errors.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}
