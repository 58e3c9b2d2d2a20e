/// Observer for download progress. Every method defaults to a no-op, so
/// omitting it changes nothing but what the user sees.
pub trait TransferProgress: Send + Sync {
    fn begin(&self, _label: &str, _total_bytes: Option<u64>) {}

    fn advance(&self, _bytes: u64) {}

    fn finish(&self) {}
}

pub struct NoProgress;

impl TransferProgress for NoProgress {}
