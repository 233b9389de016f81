//! Verdict evaluation.
//!
//! Criteria are free text. A [`CriteriaJudge`] rates each one against the
//! evidence at hand, and [`evaluate`] combines those ratings with any verdict
//! the model asserted. Precedence, highest first:
//!
//! 1. a satisfied fail criterion yields FAIL, whatever the model claims;
//! 2. all pass criteria satisfied yields PASS;
//! 3. a model-asserted verdict is accepted when the criteria cannot decide,
//!    except that an asserted PASS contradicted by an unmet pass criterion
//!    becomes FAIL;
//! 4. otherwise the loop continues.

use crate::provider::Observation;
use pagerun_core::{Verdict, VerdictSource};

/// How a single criterion relates to the evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Judgment {
    Satisfied,
    NotSatisfied,
    Indeterminate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CriterionKind {
    Pass,
    Fail,
}

/// What the judge may look at.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evidence {
    pub url: String,
    pub title: String,
    pub page_text: String,
    /// `page_text` is only a prefix of what the page shows.
    pub text_truncated: bool,
    pub facts: Vec<String>,
}

impl Evidence {
    pub fn from_observation(observation: &Observation, facts: &[String]) -> Self {
        Self {
            url: observation.url.clone(),
            title: observation.title.clone(),
            page_text: observation.page_text.clone(),
            text_truncated: observation.text_truncated,
            facts: facts.to_vec(),
        }
    }

    /// Case-insensitive search over text, title, URL and facts.
    pub fn mentions(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        if needle.is_empty() {
            return false;
        }
        std::iter::once(&self.page_text)
            .chain(std::iter::once(&self.title))
            .chain(std::iter::once(&self.url))
            .chain(self.facts.iter())
            .any(|haystack| haystack.to_lowercase().contains(&needle))
    }
}

/// Rates one criterion against the evidence.
pub trait CriteriaJudge: Send + Sync {
    fn judge(&self, criterion: &str, kind: CriterionKind, evidence: &Evidence) -> Judgment;
}

/// A criterion together with its rating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CriterionJudgment {
    pub criterion: String,
    pub judgment: Judgment,
}

/// Rate every criterion in `criteria`.
pub fn judge_all(
    judge: &dyn CriteriaJudge,
    criteria: &[String],
    kind: CriterionKind,
    evidence: &Evidence,
) -> Vec<CriterionJudgment> {
    criteria
        .iter()
        .map(|criterion| CriterionJudgment {
            criterion: criterion.clone(),
            judgment: judge.judge(criterion, kind, evidence),
        })
        .collect()
}

/// Evaluator decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    Continue,
    Terminal {
        verdict: Verdict,
        source: VerdictSource,
        rationale: String,
    },
}

/// Combine criterion ratings with an optional model-asserted verdict.
pub fn evaluate(
    pass: &[CriterionJudgment],
    fail: &[CriterionJudgment],
    asserted: Option<Verdict>,
) -> Evaluation {
    if let Some(hit) = fail.iter().find(|c| c.judgment == Judgment::Satisfied) {
        return Evaluation::Terminal {
            verdict: Verdict::Fail,
            source: VerdictSource::Criteria,
            rationale: format!("fail criterion met: {}", hit.criterion),
        };
    }

    if !pass.is_empty() && pass.iter().all(|c| c.judgment == Judgment::Satisfied) {
        return Evaluation::Terminal {
            verdict: Verdict::Pass,
            source: VerdictSource::Criteria,
            rationale: "all pass criteria met".to_string(),
        };
    }

    match asserted {
        Some(Verdict::Pass) => match pass.iter().find(|c| c.judgment == Judgment::NotSatisfied) {
            Some(unmet) => Evaluation::Terminal {
                verdict: Verdict::Fail,
                source: VerdictSource::Criteria,
                rationale: format!("model asserted PASS but pass criterion not met: {}", unmet.criterion),
            },
            None => Evaluation::Terminal {
                verdict: Verdict::Pass,
                source: VerdictSource::ModelAsserted,
                rationale: "model asserted PASS; criteria not automatically decidable".to_string(),
            },
        },
        Some(verdict) => Evaluation::Terminal {
            verdict,
            source: VerdictSource::ModelAsserted,
            rationale: format!("model asserted {}", verdict),
        },
        None => Evaluation::Continue,
    }
}

/// Heuristic judge working from page text, title, URL and facts.
///
/// * `url contains X` / `url includes X` / `redirected to X` match the URL;
/// * quoted phrases must all appear in the evidence; a phrase missing from
///   a truncated excerpt is indeterminate;
/// * fail criteria about errors or 404s match obvious error pages;
/// * `<phrase> is visible|shown|displayed` matches when the phrase appears.
///
/// Anything else is indeterminate.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvidenceJudge;

const URL_PATTERNS: [&str; 5] = [
    "url contains ",
    "url includes ",
    "url has ",
    "redirected to ",
    "redirects to ",
];
const ERROR_MENTIONS: [&str; 4] = ["404", "not found", "error", "oops"];
const ERROR_PAGE_TERMS: [&str; 6] = ["404", "not-found", "not found", "error", "oops", "uh-oh"];
const VISIBILITY_WORDS: [&str; 5] = [" visible", " shown", " displayed", " appears", " is present"];

impl CriteriaJudge for EvidenceJudge {
    fn judge(&self, criterion: &str, kind: CriterionKind, evidence: &Evidence) -> Judgment {
        let lower = criterion.to_lowercase();

        if let Some(fragment) = url_fragment(&lower) {
            return if evidence.url.to_lowercase().contains(&fragment) {
                Judgment::Satisfied
            } else {
                Judgment::NotSatisfied
            };
        }

        let phrases = quoted_phrases(criterion);
        if !phrases.is_empty() {
            return if phrases.iter().all(|phrase| evidence.mentions(phrase)) {
                Judgment::Satisfied
            } else if evidence.text_truncated {
                Judgment::Indeterminate
            } else {
                Judgment::NotSatisfied
            };
        }

        if kind == CriterionKind::Fail
            && ERROR_MENTIONS.iter().any(|term| lower.contains(term))
            && is_error_page(evidence)
        {
            return Judgment::Satisfied;
        }

        match visible_subject(&lower) {
            Some(subject) if evidence.mentions(&subject) => Judgment::Satisfied,
            _ => Judgment::Indeterminate,
        }
    }
}

fn url_fragment(lower: &str) -> Option<String> {
    URL_PATTERNS.iter().find_map(|pattern| {
        let start = lower.find(pattern)? + pattern.len();
        let token = lower[start..].split_whitespace().next()?;
        let token = token.trim_matches(|c: char| {
            matches!(c, '"' | '\'' | '`' | '“' | '”' | '.' | ',' | ';' | '(' | ')')
        });
        (!token.is_empty()).then(|| token.to_string())
    })
}

/// Phrases in double quotes, curly quotes or standalone single quotes.
fn quoted_phrases(text: &str) -> Vec<String> {
    let mut phrases = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let close = match chars[i] {
            '"' => Some('"'),
            '“' => Some('”'),
            '\'' if i == 0 || !chars[i - 1].is_alphanumeric() => Some('\''),
            _ => None,
        };
        if let Some(close) = close {
            let end = (i + 1..chars.len()).find(|&j| {
                chars[j] == close
                    && (close != '\'' || chars.get(j + 1).map_or(true, |c| !c.is_alphanumeric()))
            });
            if let Some(end) = end {
                let phrase: String = chars[i + 1..end].iter().collect();
                let phrase = phrase.trim();
                if !phrase.is_empty() {
                    phrases.push(phrase.to_string());
                }
                i = end + 1;
                continue;
            }
        }
        i += 1;
    }
    phrases
}

fn is_error_page(evidence: &Evidence) -> bool {
    let url = evidence.url.to_lowercase();
    let title = evidence.title.to_lowercase();
    let text = evidence.page_text.to_lowercase();
    ERROR_PAGE_TERMS
        .iter()
        .any(|term| url.contains(term) || title.contains(term))
        || text.contains("404 not found")
        || text.contains("page not found")
}

/// `the error banner is visible` -> `error banner`.
fn visible_subject(lower: &str) -> Option<String> {
    let end = VISIBILITY_WORDS
        .iter()
        .filter_map(|word| lower.find(word))
        .min()?;
    let mut subject = lower[..end].trim();
    for suffix in [" is", " are", " becomes", " gets"] {
        subject = subject.strip_suffix(suffix).unwrap_or(subject).trim();
    }
    for prefix in ["the ", "a ", "an "] {
        subject = subject.strip_prefix(prefix).unwrap_or(subject);
    }
    let subject = subject.trim();
    (!subject.is_empty()).then(|| subject.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evidence(url: &str, title: &str, text: &str) -> Evidence {
        Evidence {
            url: url.into(),
            title: title.into(),
            page_text: text.into(),
            text_truncated: false,
            facts: Vec::new(),
        }
    }

    fn judged(criterion: &str, judgment: Judgment) -> CriterionJudgment {
        CriterionJudgment {
            criterion: criterion.into(),
            judgment,
        }
    }

    #[test]
    fn test_fail_criterion_dominates_asserted_pass() {
        let result = evaluate(
            &[judged("welcome shown", Judgment::Satisfied)],
            &[judged("error banner visible", Judgment::Satisfied)],
            Some(Verdict::Pass),
        );
        assert!(matches!(
            result,
            Evaluation::Terminal {
                verdict: Verdict::Fail,
                source: VerdictSource::Criteria,
                ..
            }
        ));
    }

    #[test]
    fn test_all_pass_criteria() {
        let result = evaluate(
            &[judged("a", Judgment::Satisfied), judged("b", Judgment::Satisfied)],
            &[judged("c", Judgment::Indeterminate)],
            None,
        );
        assert!(matches!(
            result,
            Evaluation::Terminal {
                verdict: Verdict::Pass,
                source: VerdictSource::Criteria,
                ..
            }
        ));
    }

    #[test]
    fn test_asserted_pass_accepted_when_indeterminate() {
        let result = evaluate(
            &[judged("a", Judgment::Satisfied), judged("b", Judgment::Indeterminate)],
            &[judged("c", Judgment::Indeterminate)],
            Some(Verdict::Pass),
        );
        assert!(matches!(
            result,
            Evaluation::Terminal {
                verdict: Verdict::Pass,
                source: VerdictSource::ModelAsserted,
                ..
            }
        ));
    }

    #[test]
    fn test_asserted_pass_contradicted() {
        let result = evaluate(
            &[judged("'Order placed' shown", Judgment::NotSatisfied)],
            &[],
            Some(Verdict::Pass),
        );
        assert!(matches!(
            result,
            Evaluation::Terminal {
                verdict: Verdict::Fail,
                source: VerdictSource::Criteria,
                ..
            }
        ));
    }

    #[test]
    fn test_asserted_fail_accepted() {
        let result = evaluate(&[judged("a", Judgment::Indeterminate)], &[], Some(Verdict::Fail));
        assert!(matches!(
            result,
            Evaluation::Terminal {
                verdict: Verdict::Fail,
                source: VerdictSource::ModelAsserted,
                ..
            }
        ));
    }

    #[test]
    fn test_no_evidence_continues() {
        let result = evaluate(
            &[judged("a", Judgment::NotSatisfied)],
            &[judged("b", Judgment::Indeterminate)],
            None,
        );
        assert_eq!(result, Evaluation::Continue);
    }

    #[test]
    fn test_judge_url_patterns() {
        let judge = EvidenceJudge;
        let ev = evidence("https://shop.test/account/dashboard", "Dashboard", "");
        assert_eq!(
            judge.judge("URL contains /dashboard", CriterionKind::Pass, &ev),
            Judgment::Satisfied
        );
        assert_eq!(
            judge.judge("User is redirected to '/welcome'.", CriterionKind::Pass, &ev),
            Judgment::NotSatisfied
        );
    }

    #[test]
    fn test_judge_quoted_phrases() {
        let judge = EvidenceJudge;
        let ev = evidence("https://a.test", "Home", "Welcome back, Ada! You have 3 messages.");
        assert_eq!(
            judge.judge("Text \"welcome back\" is shown", CriterionKind::Pass, &ev),
            Judgment::Satisfied
        );
        assert_eq!(
            judge.judge("The page shows 'Invalid password'", CriterionKind::Fail, &ev),
            Judgment::NotSatisfied
        );
        // Apostrophes inside words are not quotes.
        assert_eq!(
            judge.judge("The user's inbox loads", CriterionKind::Pass, &ev),
            Judgment::Indeterminate
        );
    }

    #[test]
    fn test_phrase_missing_from_truncated_text_is_undecided() {
        let judge = EvidenceJudge;
        let mut ev = evidence("https://shop.test/done", "Thanks", &"filler ".repeat(500));
        ev.text_truncated = true;
        assert_eq!(
            judge.judge("\"Order confirmed\" is shown", CriterionKind::Pass, &ev),
            Judgment::Indeterminate
        );

        ev.page_text.push_str("Order confirmed");
        assert_eq!(
            judge.judge("\"Order confirmed\" is shown", CriterionKind::Pass, &ev),
            Judgment::Satisfied
        );
    }

    #[test]
    fn test_judge_error_page() {
        let judge = EvidenceJudge;
        let ev = evidence("https://a.test/404", "Page Not Found", "");
        assert_eq!(
            judge.judge("A 404 page appears", CriterionKind::Fail, &ev),
            Judgment::Satisfied
        );
        // Only fail criteria use the error page heuristic.
        assert_eq!(
            judge.judge("No error occurs", CriterionKind::Pass, &ev),
            Judgment::Indeterminate
        );
    }

    #[test]
    fn test_judge_visible_subject() {
        let judge = EvidenceJudge;
        let ev = evidence("https://a.test/pay", "Checkout", "Error banner: card declined");
        assert_eq!(
            judge.judge("error banner visible", CriterionKind::Fail, &ev),
            Judgment::Satisfied
        );
        assert_eq!(
            judge.judge("The receipt is displayed", CriterionKind::Pass, &ev),
            Judgment::Indeterminate
        );
    }

    #[test]
    fn test_facts_count_as_evidence() {
        let mut ev = evidence("https://a.test", "", "");
        ev.facts.push("Order number is A-1001".into());
        assert!(ev.mentions("a-1001"));
    }

    #[test]
    fn test_quoted_phrases() {
        assert_eq!(
            quoted_phrases(r#"Shows "Saved" and 'Done', not the user's name"#),
            vec!["Saved", "Done"]
        );
    }
}
