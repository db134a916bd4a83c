use std::sync::Arc;
use std::time::Duration;

use image::{codecs::jpeg::JpegEncoder, ImageEncoder, RgbImage};
use reqwest::multipart;
use tokio::runtime::Handle;
use tracing::{error, trace};

use crate::{Diagnostics, MessageSender, SharedState};

const API_BASE: &str = "https://api.telegram.org";

/// Calls the Telegram Bot HTTP API directly over `reqwest`.
///
/// Holds a handle into the process's one long-lived `tokio` runtime (owned
/// by the bot listener) rather than spinning up a runtime per call; each
/// send is spawned as a fire-and-forget task so a slow or failed delivery
/// never blocks the aggregator thread that called `send_text`/`send_image`.
pub struct TelegramMessageSender {
    state: SharedState,
    runtime: Handle,
    client: reqwest::Client,
    token: String,
    chat_id: String,
}

impl TelegramMessageSender {
    pub fn new(runtime: Handle, token: String, chat_id: String) -> Self {
        Self {
            state: SharedState::new(),
            runtime,
            client: reqwest::Client::new(),
            token,
            chat_id,
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{API_BASE}/bot{}/{method}", self.token)
    }

    fn encode_jpeg(image: &RgbImage) -> Option<Vec<u8>> {
        let mut buf = Vec::new();
        let encoder = JpegEncoder::new(&mut buf);
        match encoder.write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgb8,
        ) {
            Ok(()) => Some(buf),
            Err(err) => {
                error!(target: "balrog::sender", %err, "failed to encode image for telegram delivery");
                None
            }
        }
    }
}

impl MessageSender for TelegramMessageSender {
    fn send_text(&self, text: &str) {
        let client = self.client.clone();
        let url = self.method_url("sendMessage");
        let chat_id = self.chat_id.clone();
        let text = text.to_owned();
        self.runtime.spawn(async move {
            let body = serde_json::json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "Markdown",
            });
            if let Err(err) = client.post(&url).json(&body).send().await {
                error!(target: "balrog::sender", %err, "telegram sendMessage failed");
            }
        });
    }

    fn send_image(&self, image: &RgbImage, caption: &str, force: bool) {
        if self.state.is_muted() && !force {
            trace!(target: "balrog::sender", %caption, "muted, dropping image");
            return;
        }
        let Some(jpeg) = Self::encode_jpeg(image) else {
            return;
        };
        let client = self.client.clone();
        let url = self.method_url("sendPhoto");
        let chat_id = self.chat_id.clone();
        let caption = caption.to_owned();
        self.runtime.spawn(async move {
            let part = multipart::Part::bytes(jpeg)
                .file_name("frame.jpg")
                .mime_str("image/jpeg")
                .expect("static mime string is valid");
            let form = multipart::Form::new()
                .text("chat_id", chat_id)
                .text("caption", caption)
                .part("photo", part);
            if let Err(err) = client.post(&url).multipart(form).send().await {
                error!(target: "balrog::sender", %err, "telegram sendPhoto failed");
            }
        });
    }

    fn set_live_image(&self, image: RgbImage) {
        self.state.set_live_image(image);
    }

    fn set_last_cascade_image(&self, image: RgbImage) {
        self.state.set_last_cascade_image(image);
    }

    fn set_diagnostics(&self, diagnostics: Diagnostics) {
        self.state.set_diagnostics(diagnostics);
    }

    fn live_image(&self) -> Option<Arc<RgbImage>> {
        self.state.live_image()
    }

    fn last_cascade_image(&self) -> Option<Arc<RgbImage>> {
        self.state.last_cascade_image()
    }

    fn diagnostics(&self) -> Diagnostics {
        self.state.diagnostics()
    }

    fn mute_for(&self, duration: Duration) {
        self.state.mute_for(duration);
    }

    fn is_muted(&self) -> bool {
        self.state.is_muted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn method_url_embeds_token() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let sender = TelegramMessageSender::new(
            runtime.handle().clone(),
            "abc123".to_owned(),
            "chat1".to_owned(),
        );
        assert_eq!(
            sender.method_url("sendMessage"),
            "https://api.telegram.org/botabc123/sendMessage"
        );
    }

    #[test]
    fn encode_jpeg_produces_nonempty_bytes() {
        let frame = RgbImage::from_pixel(8, 8, Rgb([10, 20, 30]));
        let bytes = TelegramMessageSender::encode_jpeg(&frame).expect("encode should succeed");
        assert!(!bytes.is_empty());
    }
}
