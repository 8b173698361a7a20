use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::ModelError;
use crate::models::{EncodedImage, RawModelOutput};

pub const DEMO_KEY: &str = "DEMO_KEY";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Fixed analysis prompt. Its key names and value vocabularies are what the
/// extractor and renderer expect, so it must not drift.
pub const ANALYSIS_PROMPT: &str = r#"Görseldeki nesneyi analiz et ve aşağıdaki JSON formatında yanıt ver. Tüm alanlar zorunludur ve boş bırakılamaz:

{
  "nesne": {
    "isim": "Nesnenin tam adı",
    "kategori": "Elektronik/Plastik/Metal/Kağıt/Cam/Diğer"
  },
  "malzeme": {
    "ana_malzeme": "Ana malzeme türü",
    "bilesenler": ["Bileşen 1", "Bileşen 2"],
    "saflik_durumu": "TEK_MALZEME veya KARISIK"
  },
  "geri_donusum": {
    "uygunluk": "EVET veya HAYIR",
    "uygunluk_yuzdesi": 0-100 arası sayı,
    "kategori": "Plastik #1 PET/Kağıt/Metal/Cam vb.",
    "kutu_rengi": "MAVİ/YEŞİL/GRİ/SARI"
  },
  "prosedur": {
    "temizlik": ["Gerekli temizlik adımı 1", "Gerekli temizlik adımı 2"],
    "ayristirma": ["Gerekli ayrıştırma adımı 1", "Gerekli ayrıştırma adımı 2"]
  },
  "cevresel_etki": {
    "bozunma_suresi": "Yaklaşık süre (yıl)",
    "risk_seviyesi": "DUSUK/ORTA/YUKSEK",
    "co2_etkisi": "kg CO2/yıl"
  },
  "oneriler": {
    "yeniden_kullanim": ["Öneri 1", "Öneri 2"],
    "guvenlik_uyarilari": ["Uyarı 1", "Uyarı 2"]
  }
}

Lütfen tüm değerleri kesin ve net olarak belirt. Tahminlerden kaçın. JSON formatına kesinlikle uy ve tüm alanları doldur."#;

/// Canned completion served in demo mode, shaped like a real (chatty) reply.
const DEMO_COMPLETION: &str = r#"İşte analiz sonucu:
```json
{
  "nesne": { "isim": "Plastik Su Şişesi", "kategori": "Plastik" },
  "malzeme": {
    "ana_malzeme": "PET",
    "bilesenler": ["PET gövde", "HDPE kapak", "PP etiket"],
    "saflik_durumu": "KARISIK"
  },
  "geri_donusum": {
    "uygunluk": "EVET",
    "uygunluk_yuzdesi": 85,
    "kategori": "Plastik #1 PET",
    "kutu_rengi": "SARI"
  },
  "prosedur": {
    "temizlik": ["Şişeyi boşaltın", "Suyla çalkalayın"],
    "ayristirma": ["Kapağı ayırın", "Etiketi sökün"]
  },
  "cevresel_etki": {
    "bozunma_suresi": "450 yıl",
    "risk_seviyesi": "YUKSEK",
    "co2_etkisi": "0.08 kg CO2/yıl"
  },
  "oneriler": {
    "yeniden_kullanim": ["Saksı olarak kullanın", "Tohum saklama kabı yapın"],
    "guvenlik_uyarilari": ["Sıcak sıvı doldurmayın"]
  }
}
```"#;

#[async_trait]
pub trait VisionModel: Send + Sync {
    /// One completion for `prompt` plus the inline image. No retries.
    async fn analyze(&self, encoded: &EncodedImage, prompt: &str) -> Result<RawModelOutput, ModelError>;

    fn model_name(&self) -> &str;
}

// Helper function to truncate base64 data in JSON for cleaner logging
fn truncate_base64_in_json(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if key == "data" {
                    if let serde_json::Value::String(s) = val {
                        if s.len() > 100 {
                            *val = serde_json::Value::String(format!("{}...[truncated {} chars]", &s[..50], s.len() - 50));
                        }
                    }
                } else {
                    truncate_base64_in_json(val);
                }
            }
        }
        serde_json::Value::Array(arr) => {
            for val in arr.iter_mut() {
                truncate_base64_in_json(val);
            }
        }
        _ => {}
    }
}

pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(config: &Config) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(config.gemini_timeout).build()?;
        Ok(Self::with_client(
            client,
            config.gemini_api_key.clone(),
            config.gemini_api_base.clone(),
            config.gemini_model.clone(),
        ))
    }

    pub fn with_client(client: Client, api_key: String, base_url: String, model: String) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }

    pub fn is_demo(&self) -> bool {
        self.api_key == DEMO_KEY
    }

    async fn perform_api_call(&self, encoded: &EncodedImage, prompt: &str) -> Result<String, ModelError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        info!("🔗 Making request to: {}", url);

        let request_body = json!({
            "contents": [{
                "parts": [
                    {"text": prompt},
                    {"inlineData": {"mimeType": encoded.mime_type, "data": encoded.base64_payload}}
                ]
            }],
            "generationConfig": {
                "temperature": 0.4,
                "candidateCount": 1
            }
        });

        if tracing::enabled!(tracing::Level::DEBUG) {
            let mut logged = request_body.clone();
            truncate_base64_in_json(&mut logged);
            debug!("📤 Request body: {}", serde_json::to_string_pretty(&logged).unwrap_or_default());
        }

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        let status = response.status();
        info!("📥 Response status: {}", status);

        let response_text = response
            .text()
            .await
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        if !status.is_success() {
            error!("❌ API Error response: {}", response_text);
            return Err(ModelError::Status { status: status.as_u16(), body: response_text });
        }

        debug!("📥 Raw Gemini API response: {}", response_text);

        let parsed: GeminiResponse = serde_json::from_str(&response_text)
            .map_err(|e| ModelError::Decode(e.to_string()))?;

        first_text(&parsed).ok_or(ModelError::EmptyResponse)
    }
}

#[async_trait]
impl VisionModel for GeminiClient {
    async fn analyze(&self, encoded: &EncodedImage, prompt: &str) -> Result<RawModelOutput, ModelError> {
        if self.is_demo() {
            warn!("Using demo mode - returning canned analysis");
            return Ok(RawModelOutput { text: DEMO_COMPLETION.to_string() });
        }

        info!(
            "Analyzing {} image ({} base64 chars) with {}",
            encoded.mime_type,
            encoded.base64_payload.len(),
            self.model
        );
        let text = self.perform_api_call(encoded, prompt).await?;
        info!("✅ Model returned {} chars", text.len());
        Ok(RawModelOutput { text })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Shortens an API key for logs: `AIzaSyAB…` style prefix only.
pub fn mask_key(api_key: &str) -> String {
    let prefix: String = api_key.chars().take(6).collect();
    format!("{prefix}***")
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate { #[serde(default)] content: Content }

#[derive(Debug, Deserialize, Default)]
struct Content { #[serde(default)] parts: Vec<Part> }

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    #[allow(dead_code)]
    Other(serde_json::Value),
}

fn first_text(resp: &GeminiResponse) -> Option<String> {
    let candidate = resp.candidates.first()?;
    candidate.content.parts.iter().find_map(|part| match part {
        Part::Text { text } if !text.trim().is_empty() => Some(text.trim().to_string()),
        _ => None,
    })
}
