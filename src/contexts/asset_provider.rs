//! Realizes replacement-plan entries into image assets.
//!
//! Author-sourced entries pick one of the paper's own images; everything
//! else is drawn as an SVG by the generation service.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

use crate::contexts::agent_runner::{
    AgentModelRegistry, AgentRegistry, AgentRunner, AgentRunnerError, GenerationService,
};
use crate::contexts::content_extractor::extract_fenced;
use crate::data::{Asset, AssetSource, CandidateImage, Diagnostics, ReplacementPlanEntry};

const COMPONENT: &str = "asset_provider";

/// Index returned when no candidate matches
pub const NOT_FOUND: i64 = -1;

const SVG_MIME_TYPE: &str = "image/svg+xml";
const DEFAULT_DIMENSION: &str = "100";

/// The image-asset collaborators
pub trait AssetProvider {
    /// Zero-based index into `candidate_names`, or `NOT_FOUND`
    fn select_author_asset(
        &self,
        title: &str,
        description: &str,
        candidate_names: &[String],
    ) -> Result<i64, AgentRunnerError>;

    /// A self-contained SVG document for the placeholder
    fn synthesize(
        &self,
        name: &str,
        description: &str,
        width: &str,
        height: &str,
    ) -> Result<String, AgentRunnerError>;
}

#[derive(Serialize)]
struct SearchInput<'i> {
    title: &'i str,
    description: &'i str,
    candidate_list: String,
}

#[derive(Serialize)]
struct SvgInput<'i> {
    name: &'i str,
    description: &'i str,
    width: &'i str,
    height: &'i str,
}

/// Asset provider backed by the `search_author_image` and `generate_svg` agents
pub struct AgentAssetProvider<'a, R: ?Sized, M: ?Sized> {
    service: &'a dyn GenerationService,
    agents: &'a R,
    models: &'a M,
    diagnostics: &'a dyn Diagnostics,
}

impl<'a, R, M> AgentAssetProvider<'a, R, M>
where
    R: AgentRegistry + ?Sized,
    M: AgentModelRegistry + ?Sized,
{
    pub fn new(
        service: &'a dyn GenerationService,
        agents: &'a R,
        models: &'a M,
        diagnostics: &'a dyn Diagnostics,
    ) -> Self {
        Self {
            service,
            agents,
            models,
            diagnostics,
        }
    }
}

impl<'a, R, M> AssetProvider for AgentAssetProvider<'a, R, M>
where
    R: AgentRegistry + ?Sized,
    M: AgentModelRegistry + ?Sized,
{
    fn select_author_asset(
        &self,
        title: &str,
        description: &str,
        candidate_names: &[String],
    ) -> Result<i64, AgentRunnerError> {
        if candidate_names.is_empty() {
            return Ok(NOT_FOUND);
        }

        let input = SearchInput {
            title,
            description,
            candidate_list: serde_json::to_string(candidate_names).unwrap_or_default(),
        };
        let reply = AgentRunner::new("search_author_image", input, self.agents, self.models)
            .run(self.service)?
            .output;

        Ok(parse_index(&reply).unwrap_or_else(|| {
            self.diagnostics.warn(
                COMPONENT,
                &format!("Image search returned no index for '{}': {}", title, reply.trim()),
            );
            NOT_FOUND
        }))
    }

    fn synthesize(
        &self,
        name: &str,
        description: &str,
        width: &str,
        height: &str,
    ) -> Result<String, AgentRunnerError> {
        let input = SvgInput {
            name,
            description,
            width,
            height,
        };
        let reply = AgentRunner::new("generate_svg", input, self.agents, self.models)
            .run(self.service)?
            .output;

        Ok(extract_fenced(&reply, "svg", self.diagnostics))
    }
}

fn index_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-?\d+").expect("valid index regex"))
}

/// Reads the index out of a reply that should be a bare number
fn parse_index(reply: &str) -> Option<i64> {
    let trimmed = reply.trim();
    trimmed
        .parse::<i64>()
        .ok()
        .or_else(|| index_re().find(trimmed).and_then(|m| m.as_str().parse().ok()))
}

/// Resolves every plan entry into an asset.
///
/// Entries whose author image cannot be found, or whose source is unknown,
/// produce no asset. When no candidate images exist every entry is drawn.
/// A failing service call aborts the whole resolution.
pub fn resolve_assets(
    plan: &[ReplacementPlanEntry],
    candidates: &[CandidateImage],
    provider: &dyn AssetProvider,
    diagnostics: &dyn Diagnostics,
) -> Result<Vec<Asset>, AgentRunnerError> {
    let candidate_names: Vec<String> = candidates.iter().map(|c| c.name.clone()).collect();
    let mut assets = Vec::new();

    for entry in plan {
        let value = entry.value.clone().unwrap_or_default();

        if entry.source == AssetSource::Synthesized || candidates.is_empty() {
            let svg = provider.synthesize(
                &entry.name,
                &entry.description,
                entry.width.as_deref().unwrap_or(DEFAULT_DIMENSION),
                entry.height.as_deref().unwrap_or(DEFAULT_DIMENSION),
            )?;
            assets.push(Asset {
                id: entry.id.clone(),
                mime_type: SVG_MIME_TYPE.to_string(),
                payload: BASE64.encode(svg.as_bytes()),
                source: AssetSource::Synthesized,
                value,
            });
            continue;
        }

        if entry.source != AssetSource::Author {
            diagnostics.info(
                COMPONENT,
                &format!("Skipping '{}': unknown asset source", entry.id),
            );
            continue;
        }

        let index = provider.select_author_asset(&entry.name, &entry.description, &candidate_names)?;
        match usize::try_from(index).ok().and_then(|i| candidates.get(i)) {
            Some(candidate) => assets.push(Asset {
                id: entry.id.clone(),
                mime_type: candidate.mime_type.clone(),
                payload: candidate.payload.clone(),
                source: AssetSource::Author,
                value,
            }),
            None => diagnostics.info(
                COMPONENT,
                &format!("No author image matches '{}' (index {})", entry.id, index),
            ),
        }
    }

    Ok(assets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contexts::agent_runner::ExecutionError;
    use crate::data::RecordingDiagnostics;
    use std::cell::RefCell;

    struct FixedProvider {
        index: i64,
        searches: RefCell<Vec<Vec<String>>>,
        drawn: RefCell<Vec<(String, String, String)>>,
        fail: bool,
    }

    impl FixedProvider {
        fn new(index: i64) -> Self {
            Self {
                index,
                searches: RefCell::new(Vec::new()),
                drawn: RefCell::new(Vec::new()),
                fail: false,
            }
        }
    }

    impl AssetProvider for FixedProvider {
        fn select_author_asset(&self, _t: &str, _d: &str, names: &[String]) -> Result<i64, AgentRunnerError> {
            self.searches.borrow_mut().push(names.to_vec());
            Ok(self.index)
        }

        fn synthesize(&self, name: &str, _d: &str, width: &str, height: &str) -> Result<String, AgentRunnerError> {
            if self.fail {
                return Err(ExecutionError::ExecutionFailed("down".to_string()).into());
            }
            self.drawn
                .borrow_mut()
                .push((name.to_string(), width.to_string(), height.to_string()));
            Ok("<svg>".to_string())
        }
    }

    fn entry(id: &str, source: AssetSource) -> ReplacementPlanEntry {
        ReplacementPlanEntry {
            source,
            description: format!("{} description", id),
            id: id.to_string(),
            name: id.to_string(),
            width: Some("40".to_string()),
            height: None,
            value: Some(format!("{} label", id)),
        }
    }

    fn candidate(name: &str) -> CandidateImage {
        CandidateImage {
            name: name.to_string(),
            mime_type: "image/png".to_string(),
            payload: format!("{}-bytes", name),
        }
    }

    #[test]
    fn test_synthesized_entry_is_base64_svg() {
        let provider = FixedProvider::new(NOT_FOUND);
        let diagnostics = RecordingDiagnostics::new();

        let assets = resolve_assets(&[entry("bot", AssetSource::Synthesized)], &[candidate("a")], &provider, &diagnostics).unwrap();

        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].mime_type, "image/svg+xml");
        assert_eq!(assets[0].payload, "PHN2Zz4=");
        assert_eq!(assets[0].value, "bot label");
        assert_eq!(
            provider.drawn.borrow()[0],
            ("bot".to_string(), "40".to_string(), "100".to_string())
        );
    }

    #[test]
    fn test_author_entry_uses_selected_candidate() {
        let provider = FixedProvider::new(1);
        let diagnostics = RecordingDiagnostics::new();

        let assets = resolve_assets(
            &[entry("chart", AssetSource::Author)],
            &[candidate("a"), candidate("b")],
            &provider,
            &diagnostics,
        )
        .unwrap();

        assert_eq!(assets[0].payload, "b-bytes");
        assert_eq!(assets[0].mime_type, "image/png");
        assert_eq!(assets[0].source, AssetSource::Author);
        assert_eq!(provider.searches.borrow()[0], vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_author_entry_without_match_is_skipped() {
        for index in [NOT_FOUND, 5] {
            let provider = FixedProvider::new(index);
            let diagnostics = RecordingDiagnostics::new();
            let assets = resolve_assets(&[entry("chart", AssetSource::Author)], &[candidate("a")], &provider, &diagnostics).unwrap();
            assert!(assets.is_empty());
        }
    }

    #[test]
    fn test_no_candidates_draws_everything() {
        let provider = FixedProvider::new(0);
        let diagnostics = RecordingDiagnostics::new();

        let plan = [entry("chart", AssetSource::Author), entry("x", AssetSource::Unknown)];
        let assets = resolve_assets(&plan, &[], &provider, &diagnostics).unwrap();

        assert_eq!(assets.len(), 2);
        assert!(provider.searches.borrow().is_empty());
    }

    #[test]
    fn test_unknown_source_skipped_when_candidates_exist() {
        let provider = FixedProvider::new(0);
        let diagnostics = RecordingDiagnostics::new();
        let assets = resolve_assets(&[entry("x", AssetSource::Unknown)], &[candidate("a")], &provider, &diagnostics).unwrap();
        assert!(assets.is_empty());
    }

    #[test]
    fn test_provider_failure_aborts() {
        let mut provider = FixedProvider::new(0);
        provider.fail = true;
        let diagnostics = RecordingDiagnostics::new();
        assert!(resolve_assets(&[entry("bot", AssetSource::Synthesized)], &[], &provider, &diagnostics).is_err());
    }

    #[test]
    fn test_parse_index() {
        assert_eq!(parse_index(" 2\n"), Some(2));
        assert_eq!(parse_index("-1"), Some(-1));
        assert_eq!(parse_index("index: 3"), Some(3));
        assert_eq!(parse_index("none"), None);
    }
}
