//! Compatibility shim mapping raw RPC error text onto [`FailureSignal`]
//!
//! Error strings are not a stable contract across node implementations, so
//! the patterns live here and nowhere else. Everything past the adapter
//! boundary works on the structured signal.

use super::FailureSignal;

use lazy_static::lazy_static;
use regex::Regex;

/// EIP-1193 `userRejectedRequest`
const USER_REJECTED_CODE: i64 = 4001;
/// geth's `execution reverted` error code
const EXECUTION_REVERTED_CODE: i64 = 3;

lazy_static! {
    static ref ACTION_REJECTED: Regex =
        Regex::new(r"(?i)user (rejected|denied)|action[_ ]rejected|rejected by (the )?signer")
            .unwrap();
    static ref EXECUTION_REVERTED: Regex =
        Regex::new(r"(?i)execution reverted|vm exception while processing transaction: revert")
            .unwrap();
    static ref INSUFFICIENT_FUNDS: Regex =
        Regex::new(r"(?i)insufficient (funds|balance)").unwrap();
    static ref NONCE_CONFLICT: Regex = Regex::new(
        r"(?i)nonce too (low|high)|replacement (transaction )?underpriced|already known|nonce (has )?already been used|invalid nonce|nonce expired"
    )
    .unwrap();
    static ref TRANSPORT: Regex = Regex::new(
        r"(?i)time[d ]?\s?out|connection (refused|reset|closed)|network (error|unreachable)|header not found|too many requests|rate limit|\b(429|502|503|504)\b|bad gateway|service unavailable|unexpected eof|broken pipe|error sending request"
    )
    .unwrap();
}

/// Detect the failure signal for a JSON-RPC error code and message
pub fn detect(code: Option<i64>, message: &str) -> FailureSignal {
    if code == Some(USER_REJECTED_CODE) || ACTION_REJECTED.is_match(message) {
        FailureSignal::ActionRejected
    } else if code == Some(EXECUTION_REVERTED_CODE) || EXECUTION_REVERTED.is_match(message) {
        FailureSignal::Reverted
    } else if INSUFFICIENT_FUNDS.is_match(message) {
        FailureSignal::InsufficientFunds
    } else if NONCE_CONFLICT.is_match(message) {
        FailureSignal::NonceConflict
    } else if TRANSPORT.is_match(message) {
        FailureSignal::Transport
    } else {
        FailureSignal::Unrecognized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_rejection() {
        assert_eq!(detect(Some(4001), "whatever"), FailureSignal::ActionRejected);
        assert_eq!(
            detect(None, "MetaMask Tx Signature: User denied transaction signature."),
            FailureSignal::ActionRejected
        );
        assert_eq!(detect(None, "ACTION_REJECTED"), FailureSignal::ActionRejected);
    }

    #[test]
    fn test_execution_reverted() {
        assert_eq!(detect(Some(3), "execution reverted"), FailureSignal::Reverted);
        assert_eq!(
            detect(None, "VM Exception while processing transaction: revert"),
            FailureSignal::Reverted
        );
        assert_eq!(detect(Some(3), "anything"), FailureSignal::Reverted);
    }

    #[test]
    fn test_insufficient_funds() {
        assert_eq!(
            detect(
                Some(-32000),
                "insufficient funds for gas * price + value: balance 0, tx cost 42"
            ),
            FailureSignal::InsufficientFunds
        );
    }

    #[test]
    fn test_nonce_conflicts() {
        for msg in [
            "nonce too low: next nonce 12, tx nonce 11",
            "Nonce too high",
            "replacement transaction underpriced",
            "already known",
            "the tx doesn't have the correct nonce. account has nonce of: 5 tx has nonce of: 4; invalid nonce",
        ] {
            assert_eq!(detect(Some(-32000), msg), FailureSignal::NonceConflict, "{msg}");
        }
    }

    #[test]
    fn test_transport_faults() {
        for msg in [
            "request timed out",
            "operation timeout",
            "error sending request for url (http://127.0.0.1:8545/): connection refused",
            "HTTP status 503 Service Unavailable",
            "header not found",
            "429 Too Many Requests",
        ] {
            assert_eq!(detect(None, msg), FailureSignal::Transport, "{msg}");
        }
    }

    #[test]
    fn test_unrecognized() {
        assert_eq!(
            detect(Some(-32603), "internal error"),
            FailureSignal::Unrecognized
        );
    }

    #[test]
    fn test_funds_beat_transport_wording() {
        // A node timing out while reporting a balance problem is still a balance problem
        assert_eq!(
            detect(None, "insufficient funds (request timed out while simulating)"),
            FailureSignal::InsufficientFunds
        );
    }
}
