use provider_tools::ProviderPaymentStatus;
use recon_engine::db_types::OrderId;
use serde_json::Value;

use crate::errors::ServerError;

/// Pull our order reference and the normalized status out of a verified webhook body.
///
/// Providers name the merchant reference inconsistently and some nest the interesting fields
/// under a `data` envelope, so several keys are tried at both levels.
pub fn parse_webhook_body(body: &[u8]) -> Result<(OrderId, ProviderPaymentStatus), ServerError> {
    let raw: Value =
        serde_json::from_slice(body).map_err(|e| ServerError::InvalidRequestBody(format!("Invalid JSON: {e}")))?;
    let order_id = ["order_id", "reference", "merchant_ref", "partner_reference"]
        .iter()
        .find_map(|key| lookup_str(&raw, key))
        .map(OrderId::from)
        .ok_or_else(|| ServerError::InvalidRequestBody("No order reference in webhook body".to_string()))?;
    let status = ProviderPaymentStatus::from_value(raw)
        .ok_or_else(|| ServerError::InvalidRequestBody("No status field in webhook body".to_string()))?;
    Ok((order_id, status))
}

fn lookup_str(raw: &Value, key: &str) -> Option<String> {
    raw.get(key)
        .or_else(|| raw.get("data").and_then(|d| d.get(key)))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reference_is_found_at_top_level_and_in_data() {
        let body = br#"{"order_id": "ord-1", "status": "SUCCESS", "amount": 500}"#;
        let (id, status) = parse_webhook_body(body).unwrap();
        assert_eq!(id, OrderId::from("ord-1".to_string()));
        assert_eq!(status.status, "SUCCESS");
        assert_eq!(status.gross_amount, Some(500));

        let body = br#"{"data": {"reference": "ord-2", "status": "FAILED"}}"#;
        let (id, status) = parse_webhook_body(body).unwrap();
        assert_eq!(id, OrderId::from("ord-2".to_string()));
        assert_eq!(status.status, "FAILED");
    }

    #[test]
    fn missing_reference_or_status_is_rejected() {
        assert!(parse_webhook_body(br#"{"status": "SUCCESS"}"#).is_err());
        assert!(parse_webhook_body(br#"{"order_id": "ord-1"}"#).is_err());
        assert!(parse_webhook_body(b"not json").is_err());
    }
}
