/// Cache trait for storing and retrieving generation-service replies by key.
///
/// Implementations should handle errors gracefully without panicking.
pub trait Cache {
    /// Retrieves a cached reply for the given key.
    ///
    /// # Returns
    /// * `Some(String)` - The cached reply if found
    /// * `None` - If the key doesn't exist or retrieval fails
    fn get(&self, key: &str) -> Option<String>;

    /// Stores a reply in the cache for the given key.
    ///
    /// Storage errors are reported by the implementation, never returned,
    /// so a broken cache never fails a pipeline run.
    fn set(&self, key: &str, value: &str);
}
