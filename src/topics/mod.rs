pub mod catalog;
pub mod key;
pub mod matcher;

pub use catalog::expected_topics;
pub use key::{canonicalize, LabelPattern, ParenthesizedAnnotation, TopicKey, TopicKeyResolver};
pub use matcher::{build_matcher, TopicCollision, TopicMatcher};
