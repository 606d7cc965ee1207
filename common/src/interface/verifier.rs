use errors::Result;

/// External human-verification oracle. `Ok(false)` means the token was
/// examined and rejected; `Err` means the oracle itself was unreachable.
#[async_trait::async_trait]
pub trait HumanVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<bool>;
}
