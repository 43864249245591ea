mod helpers;
mod money;
mod secret;

pub use helpers::parse_boolean_flag;
pub use money::{MinorUnits, MinorUnitsConversionError, IDR_CURRENCY_CODE, IDR_CURRENCY_CODE_LOWER};
pub use secret::Secret;
