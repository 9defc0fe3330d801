//! Wallet sign-in: SIWE messages, signature verification and the session cookie.

pub mod address;
pub mod eip1271;
pub mod middleware;
pub mod session;
pub mod siwe;
pub mod verify;

pub use address::WalletAddress;
pub use middleware::{check_rate_limit, AppState, SessionAddress};
pub use session::{generate_nonce, read_session};
pub use verify::verify_sign_in;
