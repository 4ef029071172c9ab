//! Process-wide clipboard
//!
//! Holds at most one text blob for the lifetime of the application. When
//! mirroring is enabled, copies are also pushed to the host clipboard.

#[derive(Debug, Default)]
pub struct Clipboard {
    text: Option<String>,
    mirror_to_system: bool,
}

impl Clipboard {
    pub fn new(mirror_to_system: bool) -> Self {
        Self {
            text: None,
            mirror_to_system,
        }
    }

    pub fn set(&mut self, text: String) {
        if text.is_empty() {
            return;
        }
        if self.mirror_to_system {
            match arboard::Clipboard::new() {
                Ok(mut system) => {
                    if let Err(e) = system.set_text(text.clone()) {
                        tracing::warn!("System clipboard write failed: {}", e);
                    }
                }
                Err(e) => tracing::warn!("System clipboard unavailable: {}", e),
            }
        }
        self.text = Some(text);
    }

    pub fn get(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_none()
    }

    pub fn clear(&mut self) {
        self.text = None;
    }
}
