//! Built-in merge operator that keeps the highest-revision value.

use bytes::Bytes;

use super::MergeOperator;

/// Merge operator resolving conflicts by revision.
///
/// Each value is expected to carry a leading decimal revision: the ASCII
/// digits up to the first non-digit byte. The merge keeps whichever value
/// has the numerically higher revision. A value without a parseable revision
/// loses to any revisioned value, and on equal revisions (or two
/// unrevisioned values) the newer operand wins.
pub struct MaxRevMergeOperator;

/// Parses the leading decimal revision of a value, saturating on overflow.
fn revision(value: &[u8]) -> Option<u64> {
    let digits = value.iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let mut rev: u64 = 0;
    for &b in &value[..digits] {
        rev = rev.saturating_mul(10).saturating_add(u64::from(b - b'0'));
    }
    Some(rev)
}

impl MergeOperator for MaxRevMergeOperator {
    fn merge(&self, _key: &Bytes, existing_value: Option<Bytes>, operand: Bytes) -> Bytes {
        match existing_value {
            // Option ordering puts unrevisioned values below any revision.
            Some(existing) if revision(&existing) > revision(&operand) => existing,
            _ => operand,
        }
    }
}
