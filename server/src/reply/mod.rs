//! Reply Selection
//!
//! Maps normalized inbound text to a canned reply. Routers are pure: the
//! dispatcher normalizes the text, asks the router, and hands any reply to
//! the sender.

pub mod menu;
mod normalize;

pub use menu::MenuRouter;
pub use normalize::normalize_text;

/// Maps normalized message text to a reply, or `None` for no reply.
pub trait ReplyRouter: Send + Sync {
    fn route(&self, text: &str) -> Option<String>;
}

impl<F> ReplyRouter for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn route(&self, text: &str) -> Option<String> {
        self(text)
    }
}
