//! Fuzzy section-category classifier.
//!
//! Maps a free-text section heading (Spanish or English, as produced by
//! GROBID for mixed-language academic documents) to one [`SectionCategory`]
//! from the closed taxonomy. A keyword found inside the normalized heading is
//! scored with a symmetric string-similarity ratio against the full heading;
//! a keyword found only in the leading body text gets a fixed, lower
//! confidence. If nothing clears the acceptance threshold the section is
//! filed under `otros` — a deliberate precision/recall tradeoff: a false
//! "otros" is cheaper than a false specific category.

use crate::config::ClassifierConfig;
use crate::models::SectionCategory;

/// Synonym keywords per category, across Spanish and English headings.
///
/// Order matters only for tie-breaking: the first (category, keyword) pair to
/// reach a given score wins.
pub fn taxonomy() -> &'static [(SectionCategory, &'static [&'static str])] {
    use SectionCategory::*;
    &[
        (Resumen, &["resumen", "summary", "abstract", "síntesis"]),
        (Abstract, &["abstract", "resumen", "summary"]),
        (
            Introduccion,
            &["introducción", "introduction", "intro", "presentación"],
        ),
        (
            Antecedentes,
            &[
                "antecedentes",
                "background",
                "marco histórico",
                "contexto histórico",
            ],
        ),
        (
            EstadoDelArte,
            &[
                "estado del arte",
                "state of the art",
                "revisión bibliográfica",
                "literature review",
                "related work",
                "marco teórico",
            ],
        ),
        (Objetivos, &["objetivos", "objectives", "goals", "propósitos"]),
        (
            Justificacion,
            &["justificación", "justification", "motivación", "motivation"],
        ),
        (
            ObjetivoGeneral,
            &[
                "objetivo general",
                "general objective",
                "main objective",
                "propósito general",
            ],
        ),
        (
            Hipotesis,
            &["hipótesis", "hypothesis", "supuestos", "assumptions"],
        ),
        (
            Metodologia,
            &[
                "metodología",
                "methodology",
                "métodos",
                "methods",
                "diseño metodológico",
            ],
        ),
        (Resultados, &["resultados", "results", "findings", "hallazgos"]),
        (
            Conclusiones,
            &[
                "conclusiones",
                "conclusions",
                "conclusión",
                "conclusion",
                "cierre",
            ],
        ),
    ]
}

/// Classify a heading, optionally aided by the leading body content.
///
/// Pure: identical inputs always produce identical results, so ingestion may
/// reprocess documents freely.
pub fn categorize(heading: &str, body_preview: &str, cfg: &ClassifierConfig) -> SectionCategory {
    let heading_clean = normalize(heading);
    let content_start: String = body_preview
        .chars()
        .take(cfg.body_preview_chars)
        .collect::<String>()
        .to_lowercase();

    let mut best: Option<SectionCategory> = None;
    let mut best_score = 0.0f64;

    for (category, keywords) in taxonomy() {
        for keyword in *keywords {
            if heading_clean.contains(keyword) {
                let score = similarity(&heading_clean, keyword);
                if score > best_score {
                    best_score = score;
                    best = Some(*category);
                }
            }

            // Weaker evidence: keyword only appears in the body preview.
            if content_start.contains(keyword) && cfg.body_confidence > best_score {
                best_score = cfg.body_confidence;
                best = Some(*category);
            }
        }
    }

    if best_score > cfg.accept_threshold {
        best.unwrap_or(SectionCategory::Otros)
    } else {
        SectionCategory::Otros
    }
}

/// Lowercase and strip everything that is not alphanumeric or whitespace.
fn normalize(heading: &str) -> String {
    heading
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect()
}

/// Symmetric similarity ratio in [0, 1]; 1.0 means identical.
///
/// Ratcliff/Obershelp: twice the total length of matching blocks over the
/// combined length, where matching blocks are found by recursing around the
/// longest common substring. Hand-rolled here the same way the vector math
/// lives in `embedding.rs` rather than behind a dependency.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let matches = matching_chars(&a, &b);
    2.0 * matches as f64 / total as f64
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let (a_start, b_start, len) = longest_common_block(a, b);
    if len == 0 {
        return 0;
    }
    len + matching_chars(&a[..a_start], &b[..b_start])
        + matching_chars(&a[a_start + len..], &b[b_start + len..])
}

fn longest_common_block(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    // lengths[j] = match length ending at a[i], b[j-1] from the previous row
    let mut lengths = vec![0usize; b.len() + 1];
    for i in 0..a.len() {
        let mut prev_row = 0usize;
        for j in 0..b.len() {
            let diag = prev_row;
            prev_row = lengths[j + 1];
            if a[i] == b[j] {
                let len = diag + 1;
                lengths[j + 1] = len;
                if len > best.2 {
                    best = (i + 1 - len, j + 1 - len, len);
                }
            } else {
                lengths[j + 1] = 0;
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClassifierConfig;

    fn cfg() -> ClassifierConfig {
        ClassifierConfig::default()
    }

    #[test]
    fn identical_strings_score_one() {
        assert_eq!(similarity("metodología", "metodología"), 1.0);
        assert_eq!(similarity("", ""), 1.0);
    }

    #[test]
    fn disjoint_strings_score_zero() {
        assert_eq!(similarity("abc", "xyz"), 0.0);
    }

    #[test]
    fn similarity_is_symmetric() {
        let forward = similarity("introducción general", "introducción");
        let backward = similarity("introducción", "introducción general");
        assert!((forward - backward).abs() < 1e-12);
        assert!(forward > 0.0 && forward < 1.0);
    }

    #[test]
    fn spanish_headings_classify() {
        assert_eq!(categorize("Metodología", "", &cfg()), SectionCategory::Metodologia);
        assert_eq!(categorize("Resultados", "", &cfg()), SectionCategory::Resultados);
        assert_eq!(categorize("Hipótesis", "", &cfg()), SectionCategory::Hipotesis);
        assert_eq!(
            categorize("Justificación del estudio", "", &cfg()),
            SectionCategory::Justificacion
        );
    }

    #[test]
    fn english_headings_classify() {
        assert_eq!(categorize("Methodology", "", &cfg()), SectionCategory::Metodologia);
        assert_eq!(
            categorize("Related Work", "", &cfg()),
            SectionCategory::EstadoDelArte
        );
        assert_eq!(categorize("Conclusions", "", &cfg()), SectionCategory::Conclusiones);
    }

    #[test]
    fn punctuation_and_case_are_ignored() {
        assert_eq!(
            categorize("3. METODOLOGÍA:", "", &cfg()),
            SectionCategory::Metodologia
        );
    }

    #[test]
    fn unknown_heading_falls_back_to_otros() {
        assert_eq!(categorize("XYZ123", "", &cfg()), SectionCategory::Otros);
        assert_eq!(categorize("", "", &cfg()), SectionCategory::Otros);
        assert_eq!(
            categorize("Agradecimientos", "", &cfg()),
            SectionCategory::Otros
        );
    }

    #[test]
    fn body_preview_provides_weaker_evidence() {
        // Heading gives no signal; the keyword in the leading content scores
        // the fixed 0.7 confidence, which clears the 0.6 threshold.
        let body = "En esta metodología se describe el diseño experimental.";
        assert_eq!(
            categorize("Capítulo 3", body, &cfg()),
            SectionCategory::Metodologia
        );
    }

    #[test]
    fn keyword_beyond_preview_window_is_ignored() {
        let mut body = " ".repeat(300);
        body.push_str("metodología");
        assert_eq!(categorize("Capítulo 3", &body, &cfg()), SectionCategory::Otros);
    }

    #[test]
    fn heading_match_outranks_body_match() {
        // "Resultados" as exact heading scores 1.0, beating any 0.7 body hit.
        let body = "la metodología aplicada produjo estos datos";
        assert_eq!(categorize("Resultados", body, &cfg()), SectionCategory::Resultados);
    }

    #[test]
    fn categorize_is_idempotent() {
        let first = categorize("Estado del Arte", "revisión previa", &cfg());
        let second = categorize("Estado del Arte", "revisión previa", &cfg());
        assert_eq!(first, second);
        assert_eq!(first, SectionCategory::EstadoDelArte);
    }

    #[test]
    fn threshold_is_configurable() {
        let strict = ClassifierConfig {
            accept_threshold: 0.99,
            ..ClassifierConfig::default()
        };
        // "Metodología y diseño" contains the keyword but the full-heading
        // ratio is well below 0.99.
        assert_eq!(
            categorize("Metodología y diseño", "", &strict),
            SectionCategory::Otros
        );
    }
}
