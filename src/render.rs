//! Markdown rendering of an [`AnalysisReport`].
//!
//! The output format is persisted alongside each query and re-displayed
//! later, so headings and labels are reproduced byte for byte.

use serde_json::{Number, Value};

const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

use crate::error::RenderError;
use crate::models::RenderedReport;
use crate::report::{AnalysisReport, Section};

pub fn render(report: &AnalysisReport) -> Result<RenderedReport, RenderError> {
    let object = Fields::new(report, Section::Object);
    let material = Fields::new(report, Section::Material);
    let recycling = Fields::new(report, Section::Recyclability);
    let procedure = Fields::new(report, Section::Procedure);
    let impact = Fields::new(report, Section::EnvironmentalImpact);
    let advice = Fields::new(report, Section::Recommendations);

    let name = object.scalar("isim")?;
    let primary_material = material.scalar("ana_malzeme")?;
    let components = material.list("bilesenler")?.join(", ");
    let purity = material.scalar("saflik_durumu")?;
    let eligible = recycling.scalar("uygunluk")?;
    let percent = recycling.scalar("uygunluk_yuzdesi")?;
    let recycling_category = recycling.scalar("kategori")?;
    let bin_color = recycling.scalar("kutu_rengi")?;
    let cleaning = bullets(&procedure.list("temizlik")?);
    let sorting = bullets(&procedure.list("ayristirma")?);
    let decomposition = impact.scalar("bozunma_suresi")?;
    let risk = impact.scalar("risk_seviyesi")?;
    let co2 = impact.scalar("co2_etkisi")?;
    let reuse = bullets(&advice.list("yeniden_kullanim")?);
    let warnings = bullets(&advice.list("guvenlik_uyarilari")?);

    Ok(RenderedReport(format!(
        "{name}

## Malzeme Bilgisi
- **Ana Malzeme:** {primary_material}
- **Bileşenler:** {components}
- **Saflık Durumu:** {purity}

## Geri Dönüşüm Durumu
- **Uygunluk:** {eligible}
- **Uygunluk Yüzdesi:** %{percent}
- **Kategori:** {recycling_category}
- **Atılacak Kutu:** {bin_color} renkli geri dönüşüm kutusu

## Geri Dönüşüm Prosedürü
### Temizlik Adımları:
{cleaning}

### Ayrıştırma Adımları:
{sorting}

## Çevresel Etki
- **Doğada Bozunma Süresi:** {decomposition}
- **Çevresel Risk:** {risk}
- **CO2 Etkisi:** {co2}

## Öneriler
### Yeniden Kullanım:
{reuse}

### Güvenlik Uyarıları:
{warnings}
"
    )))
}

/// Field lookups within one section, failing with the dotted wire path.
struct Fields<'a> {
    section: Section,
    value: &'a Value,
}

impl<'a> Fields<'a> {
    fn new(report: &'a AnalysisReport, section: Section) -> Self {
        Self { section, value: report.section(section) }
    }

    fn scalar(&self, key: &str) -> Result<String, RenderError> {
        self.value
            .get(key)
            .and_then(scalar_text)
            .ok_or_else(|| RenderError::at(self.section, key))
    }

    fn list(&self, key: &str) -> Result<Vec<String>, RenderError> {
        let items = self
            .value
            .get(key)
            .and_then(Value::as_array)
            .ok_or_else(|| RenderError::at(self.section, key))?;
        items
            .iter()
            .map(|item| scalar_text(item).ok_or_else(|| RenderError::at(self.section, key)))
            .collect()
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(number_text(n)),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Integral floats print without a fraction (`85.0` -> `85`), matching how
/// stored reports were written.
fn number_text(n: &Number) -> String {
    match n.as_f64() {
        Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < MAX_EXACT_INTEGER => format!("{}", f as i64),
        _ => n.to_string(),
    }
}

fn bullets(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("- {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}
