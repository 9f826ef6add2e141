pub mod authority;
pub mod claims;
pub mod signed;

pub use authority::TokenAuthority;
pub use claims::{AuthorizationClaims, Claims, EmailVerifyClaims, PaymentClaims, TokenKind};
pub use signed::{SignedToken, TOKEN_VERSION};
