//! Opaque value algebra for entronet: encrypted 64-bit integers that only
//! principals holding an explicit capability grant may read or combine.
//!
//! The evaluator trait is the seam a real homomorphic backend plugs into. The
//! bundled [`MockFheEvaluator`] keeps plaintexts behind opaque handles and
//! enforces the same capability rules, which lets the chaos engine and the
//! request ledger be exercised end to end without a coprocessor.

pub mod acl;
pub mod error;
pub mod evaluator;
pub mod mock;
pub mod types;

pub use acl::AccessControlList;
pub use error::{FheError, FheResult};
pub use evaluator::{Decryptor, FheEvaluator, Ungranted};
pub use mock::{FheConfig, MockFheEvaluator};
pub use types::{Address, AddressParseError, ExternalUint64, FheUint64, Handle};
