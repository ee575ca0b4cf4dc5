#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveType {
    Zip,
}

impl ArchiveType {
    /// Infers the archive type from an asset name or download URL.
    pub fn infer_from_name(name: &str) -> Option<Self> {
        let lower = name.trim().to_ascii_lowercase();
        let without_fragment = lower.split('#').next().unwrap_or(&lower);
        let without_query = without_fragment
            .split('?')
            .next()
            .unwrap_or(without_fragment);
        let file_name = without_query.rsplit('/').next().unwrap_or("");

        if file_name.len() > ".zip".len() && file_name.ends_with(".zip") {
            return Some(Self::Zip);
        }

        None
    }
}
