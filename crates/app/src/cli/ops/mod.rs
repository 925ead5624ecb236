pub mod init;
pub mod open;
pub mod push;
pub mod seal;
pub mod version;
pub mod whoami;

pub use init::Init;
pub use open::Open;
pub use push::Push;
pub use seal::Seal;
pub use version::Version;
pub use whoami::Whoami;
