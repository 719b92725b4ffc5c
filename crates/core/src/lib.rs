pub mod category;
pub mod connection;
pub mod money;
pub mod rule;
pub mod transaction;

pub use category::{Category, DEFAULT_CATEGORIES};
pub use connection::{BankConnection, ConnectionStatus};
pub use money::{Amount, AmountOutOfRange};
pub use rule::AutoCategorizeRule;
pub use transaction::{Transaction, TransactionStatus};
