//! Shared fixtures for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::Router;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::error::{ModelError, ResolveError};
use crate::gemini::VisionModel;
use crate::models::{EncodedImage, ImageBytes, RawModelOutput};
use crate::resolver::ImageSource;

/// PNG signature plus the start of an IHDR chunk; enough for format sniffing.
pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR";

/// A complete, well-formed model answer for an object called `name`.
pub fn sample_report(name: &str) -> Value {
    json!({
        "nesne": { "isim": name, "kategori": "Plastik" },
        "malzeme": {
            "ana_malzeme": "PET",
            "bilesenler": ["A", "B"],
            "saflik_durumu": "TEK_MALZEME"
        },
        "geri_donusum": {
            "uygunluk": "EVET",
            "uygunluk_yuzdesi": 90,
            "kategori": "Plastik #1 PET",
            "kutu_rengi": "SARI"
        },
        "prosedur": {
            "temizlik": ["Rinse with water", "Let it dry"],
            "ayristirma": ["Remove the cap"]
        },
        "cevresel_etki": {
            "bozunma_suresi": "450 yıl",
            "risk_seviyesi": "YÜKSEK",
            "co2_etkisi": "0.1 kg CO2/yıl"
        },
        "oneriler": {
            "yeniden_kullanim": ["Planter", "Bird feeder"],
            "guvenlik_uyarilari": ["Do not reuse for hot drinks"]
        }
    })
}

/// Serves `router` on an ephemeral loopback port and returns its base URL.
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve test router");
    });
    format!("http://{addr}")
}

pub struct FakeImages {
    pub calls: AtomicUsize,
    outcome: Result<ImageBytes, ResolveError>,
}

impl FakeImages {
    pub fn png() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            outcome: Ok(ImageBytes {
                content: Bytes::from_static(PNG_BYTES),
                mime_type: "image/png".into(),
            }),
        }
    }

    pub fn failing(err: ResolveError) -> Self {
        Self { calls: AtomicUsize::new(0), outcome: Err(err) }
    }
}

#[async_trait]
impl ImageSource for FakeImages {
    async fn resolve(&self, _url: &str) -> Result<ImageBytes, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}

pub struct FakeModel {
    pub calls: AtomicUsize,
    outcome: Result<String, ModelError>,
    last: Mutex<Option<(EncodedImage, String)>>,
}

impl FakeModel {
    pub fn replying(text: impl Into<String>) -> Self {
        Self { calls: AtomicUsize::new(0), outcome: Ok(text.into()), last: Mutex::new(None) }
    }

    pub fn failing(err: ModelError) -> Self {
        Self { calls: AtomicUsize::new(0), outcome: Err(err), last: Mutex::new(None) }
    }

    pub fn last_request(&self) -> Option<(EncodedImage, String)> {
        self.last.lock().clone()
    }
}

#[async_trait]
impl VisionModel for FakeModel {
    async fn analyze(&self, encoded: &EncodedImage, prompt: &str) -> Result<RawModelOutput, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock() = Some((encoded.clone(), prompt.to_string()));
        self.outcome.clone().map(|text| RawModelOutput { text })
    }

    fn model_name(&self) -> &str {
        "fake-vision"
    }
}
