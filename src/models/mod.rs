mod signature;
mod split;
mod token;

pub use signature::{SignatureStatus, SplitSignature};
pub use split::{Split, SplitParticipant};
pub use token::SupportedToken;
