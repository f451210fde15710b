//! Example target service
//!
//! A tiny adder guarded by endpoint [`EXAMPLE_ENDPOINT`]. The payload is one
//! method byte followed by two little-endian `u32` operands; the response is
//! their sum as a little-endian `u64`.
//!
//! | method | name       | guard                                         |
//! |--------|------------|-----------------------------------------------|
//! | `0`    | `test`     | a prior check in the same batch               |
//! | `1`    | `test_cpi` | must be reached through a delegated call      |

use valve::{InvocationContext, Target, TargetServiceId, verify_admission, verify_delegated};

/// Endpoint protecting both methods
pub const EXAMPLE_ENDPOINT: u32 = 111;

pub const METHOD_TEST: u8 = 0;
pub const METHOD_TEST_CPI: u8 = 1;

pub struct ExampleTarget {
    id: TargetServiceId,
}

impl ExampleTarget {
    pub fn new(id: impl Into<TargetServiceId>) -> Self {
        ExampleTarget { id: id.into() }
    }

    pub fn id(&self) -> &TargetServiceId {
        &self.id
    }

    /// Encode a call payload
    pub fn encode(method: u8, a: u32, b: u32) -> Vec<u8> {
        let mut data = Vec::with_capacity(9);
        data.push(method);
        data.extend_from_slice(&a.to_le_bytes());
        data.extend_from_slice(&b.to_le_bytes());
        data
    }

    fn decode(data: &[u8]) -> Result<(u8, u32, u32), String> {
        if data.len() != 9 {
            return Err(format!("expected 9 bytes of call data, got {}", data.len()));
        }
        let operand = |range: std::ops::Range<usize>| {
            data[range]
                .try_into()
                .map(u32::from_le_bytes)
                .map_err(|_| "malformed operand".to_string())
        };
        Ok((data[0], operand(1..5)?, operand(5..9)?))
    }
}

impl Target for ExampleTarget {
    fn invoke(
        &self,
        ctx: &InvocationContext<'_>,
        data: &[u8],
        _refs: &[String],
    ) -> Result<Vec<u8>, String> {
        let (method, a, b) = Self::decode(data)?;

        match method {
            METHOD_TEST => {
                verify_admission(ctx.batch, &self.id, EXAMPLE_ENDPOINT)
                    .map_err(|e| e.to_string())?;
                tracing::debug!("test called by {}", ctx.authority.caller);
            }
            METHOD_TEST_CPI => {
                verify_delegated(ctx, &self.id, EXAMPLE_ENDPOINT).map_err(|e| e.to_string())?;
                tracing::debug!("test_cpi called by {}", ctx.authority.caller);
            }
            other => return Err(format!("unknown method {other}")),
        }

        let sum = u64::from(a) + u64::from(b);
        Ok(sum.to_le_bytes().to_vec())
    }
}
