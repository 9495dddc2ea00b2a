/// Rows per CSV shard shared by the cache writer and [`crate::PagedCsvRowSource`].
pub const DEFAULT_WINDOW_SIZE_ROWS: usize = 10_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EndpointVersion {
    /// `{"Tables": [...]}` with a trailing table-of-contents manifest.
    V1,
    /// A flat JSON array of `FrameType`-tagged frames.
    V2,
}

#[derive(Clone, Debug, Default)]
pub struct DecodeOptions {
    /// Force a wire format instead of detecting it from the document's shape.
    ///
    /// An object document is always decoded as v1 (or as a schema response when it carries a
    /// lower-case `tables` key); forcing [`EndpointVersion::V1`] on an array is a decode error.
    pub endpoint_version: Option<EndpointVersion>,
    /// Return responses carrying server `Exceptions` instead of failing with
    /// [`crate::ServerQueryError`].
    pub accept_partial_results: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CsvPageOptions {
    /// Number of rows held by each `N.csv` shard. Must match the writer.
    pub window_size_rows: usize,
}

impl Default for CsvPageOptions {
    fn default() -> Self {
        Self {
            window_size_rows: DEFAULT_WINDOW_SIZE_ROWS,
        }
    }
}
