//! Seed hit records, the raw unit of work fed into alignment.

/// A single seed match between a query context and a reference location.
///
/// `query` is the packed query-context id: for translated searches every
/// source query occupies six consecutive ids, one per reading frame.
/// `subject` is the packed location of the seed in the reference block and
/// `seed_offset` the seed position within the query context.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SeedHit {
    pub query: u32,
    pub subject: u64,
    pub seed_offset: u32,
}

impl SeedHit {
    pub fn new(query: u32, subject: u64, seed_offset: u32) -> Self {
        Self {
            query,
            subject,
            seed_offset,
        }
    }

    /// Source-query id under the given frame-context count (1 or 6).
    #[inline]
    pub fn query_id(&self, contexts: u32) -> u32 {
        self.query / contexts
    }
}
