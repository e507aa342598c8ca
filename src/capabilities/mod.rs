mod captioner;
mod composer;
mod encoder;
mod planner;

pub use captioner::{CAPTION_INSTRUCTION, Captioner};
pub use composer::{StoryComposer, WRITER_ROLE};
pub use encoder::{EncodedImage, encode};
pub use planner::{OutlinePlanner, PLANNER_ROLE};

use crate::models::Caption;

/// Numbered caption list shared by the planning and writing prompts:
/// one `N. text` line per caption, numbered from 1 in input order.
pub fn render_caption_list(captions: &[Caption]) -> String {
    captions
        .iter()
        .enumerate()
        .map(|(pos, caption)| format!("{}. {}\n", pos + 1, caption.text))
        .collect()
}
