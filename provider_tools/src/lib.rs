//! Thin HTTP + signing wrappers for the payment providers supported by the reconciliation core.
//!
//! Each provider exposes the same three operations (`create_payment`, `get_payment_status`, `create_transfer`)
//! behind [`ProviderApi`], which normalizes the wildly different response shapes into
//! [`ProviderPaymentStatus`]. Webhook authenticity and outbound callback signing live in the
//! [`signing`] module behind the [`SignatureScheme`] trait, so the weak legacy MD5 scheme used by
//! Piro and Genesis stays isolated from call sites.
mod api;
mod config;
mod data_objects;
mod error;
pub mod signing;

pub use api::ProviderApi;
pub use config::ProviderConfig;
pub use data_objects::{
    NewProviderPayment,
    ProviderId,
    ProviderPaymentStatus,
    ProviderTransfer,
    SettlementOutcome,
};
pub use error::ProviderApiError;
pub use signing::{CallbackHmac, LegacyMd5, S2sVerifyError, SignatureScheme};
