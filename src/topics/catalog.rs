use super::key::TopicKey;

/// Division numbers of the standard upload, ascending.
pub const CATALOG_DIVISIONS: [u32; 15] = [1, 3, 4, 5, 7, 9, 10, 11, 12, 27, 30, 60, 81, 108, 144];

/// Every division ships a Set-1 and a Set-2 matrix.
pub const CATALOG_SETS: [u32; 2] = [1, 2];

/// The 30 topics an upload is expected to contain, in display order.
pub fn expected_topics() -> Vec<TopicKey> {
    CATALOG_DIVISIONS
        .iter()
        .flat_map(|division| {
            CATALOG_SETS
                .iter()
                .map(move |set| TopicKey::new(*division, *set))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogue_is_thirty_ascending_topics() {
        let topics = expected_topics();
        assert_eq!(topics.len(), 30);
        assert_eq!(topics[0], TopicKey::new(1, 1));
        assert_eq!(topics[1], TopicKey::new(1, 2));
        assert_eq!(topics[29], TopicKey::new(144, 2));

        let mut sorted = topics.clone();
        sorted.sort();
        assert_eq!(sorted, topics);
    }
}
