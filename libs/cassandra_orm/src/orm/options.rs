use crate::mapping::EntityMetadata;

/// Call-site write options for `insert`/`update`; unset values fall back to
/// the entity's mapping defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    pub ttl: Option<u32>,
    pub if_not_exists: Option<bool>,
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, seconds: u32) -> Self {
        self.ttl = Some(seconds);
        self
    }

    pub fn if_not_exists(mut self, enabled: bool) -> Self {
        self.if_not_exists = Some(enabled);
        self
    }

    pub(crate) fn resolve(&self, metadata: &EntityMetadata) -> (Option<u32>, bool) {
        (
            self.ttl.or(metadata.default_ttl),
            self.if_not_exists.unwrap_or(metadata.insert_if_not_exists),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_site_overrides_entity_defaults() {
        let metadata = EntityMetadata::builder("Session")
            .field("id", "uuid")
            .default_ttl(3600)
            .insert_if_not_exists(true)
            .build()
            .unwrap();

        assert_eq!(WriteOptions::new().resolve(&metadata), (Some(3600), true));
        assert_eq!(
            WriteOptions::new()
                .with_ttl(60)
                .if_not_exists(false)
                .resolve(&metadata),
            (Some(60), false)
        );
    }
}
