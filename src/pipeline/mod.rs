pub mod stages;
pub mod video_publish;

pub use crate::policies::TRANSCODE_INTENT;
pub use video_publish::{PublishOutcome, VideoPublishPipeline};

pub const PUBLISH_INTENT: &str = "PublishVideo";
pub const THUMBNAIL_INTENT: &str = "Thumbnail";
pub const CDN_PUSH_INTENT: &str = "CDNPush";
pub const VARIANT_INTENT: &str = "Variant";
pub const SEGMENT_INTENT: &str = "Segment";
pub const EXTRACT_FRAME_INTENT: &str = "ExtractFrame";
pub const RESIZE_INTENT: &str = "Resize";
