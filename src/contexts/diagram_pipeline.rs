//! End-to-end generation for one sample: describe, draft, refine, verify,
//! repair and replace.
//!
//! Each stage is public so callers can re-run a single step; `run` chains
//! them and assembles the record that gets persisted.

use serde::Serialize;
use std::fmt;

use crate::contexts::agent_runner::{
    AgentModelRegistry, AgentRegistry, AgentRunner, AgentRunnerError, GenerationService,
};
use crate::contexts::asset_provider::{AgentAssetProvider, resolve_assets};
use crate::contexts::content_extractor::{extract_fenced, extract_tagged};
use crate::contexts::diagram_repair::repair_diagram;
use crate::contexts::placeholder_locator::find_placeholders_in;
use crate::contexts::refinement_loop::{DEFAULT_MAX_TURNS, LoopOutcome, Phase, RefinementLoop};
use crate::contexts::replacement::{apply_assets, filter_plan};
use crate::data::{
    Asset, CandidateImage, DiagramLanguage, Diagnostics, ReplacementPlanEntry, Sample, SampleRecord,
};

const COMPONENT: &str = "diagram_pipeline";
const DESCRIPTION_TAG: &str = "description";
const PLAN_FORMAT_LABEL: &str = "json";

/// Errors that end a sample's run
#[derive(Debug)]
pub enum PipelineError {
    Agent(AgentRunnerError),
    InvalidPlan(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PipelineError::Agent(e) => write!(f, "{}", e),
            PipelineError::InvalidPlan(details) => {
                write!(f, "Replacement plan is not a valid entry list: {}", details)
            }
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<AgentRunnerError> for PipelineError {
    fn from(e: AgentRunnerError) -> Self {
        PipelineError::Agent(e)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub language: DiagramLanguage,
    pub max_turns: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            language: DiagramLanguage::Drawio,
            max_turns: DEFAULT_MAX_TURNS,
        }
    }
}

/// Layout text at each generation stage
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub initial_layout: String,
    pub refinement: LoopOutcome,
    pub verification: LoopOutcome,
}

impl GenerationOutcome {
    /// The verified layout, before any repair
    pub fn final_layout(&self) -> &str {
        &self.verification.content
    }
}

#[derive(Debug, Clone)]
pub struct ReplacementOutcome {
    pub diagram: String,
    pub plan: Vec<ReplacementPlanEntry>,
    pub assets: Vec<Asset>,
}

#[derive(Serialize)]
struct DescribeInput<'i> {
    paper_content: &'i str,
    caption: &'i str,
}

#[derive(Serialize)]
struct LayoutInput<'i> {
    description: &'i str,
    language: &'i str,
}

#[derive(Serialize)]
struct RefineInput<'i> {
    diagram: &'i str,
    description: &'i str,
    caption: &'i str,
    language: &'i str,
}

#[derive(Serialize)]
struct VerifyInput<'i> {
    diagram: &'i str,
    language: &'i str,
}

#[derive(Serialize)]
struct PlanInput<'i> {
    description: &'i str,
    image_ids: String,
}

pub struct DiagramPipeline<'a, R: ?Sized, M: ?Sized> {
    service: &'a dyn GenerationService,
    agents: &'a R,
    models: &'a M,
    diagnostics: &'a dyn Diagnostics,
    options: PipelineOptions,
}

impl<'a, R, M> DiagramPipeline<'a, R, M>
where
    R: AgentRegistry + ?Sized,
    M: AgentModelRegistry + ?Sized,
{
    pub fn new(
        service: &'a dyn GenerationService,
        agents: &'a R,
        models: &'a M,
        diagnostics: &'a dyn Diagnostics,
        options: PipelineOptions,
    ) -> Self {
        Self {
            service,
            agents,
            models,
            diagnostics,
            options,
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Asks for a figure description grounded in the paper and caption
    pub fn describe(&self, sample: &Sample) -> Result<String, PipelineError> {
        let input = DescribeInput {
            paper_content: &sample.paper,
            caption: &sample.caption,
        };
        let reply = AgentRunner::new("describe_figure", input, self.agents, self.models)
            .run(self.service)?
            .output;

        Ok(extract_tagged(&reply, DESCRIPTION_TAG, self.diagnostics))
    }

    pub fn generate_initial_layout(&self, description: &str) -> Result<String, PipelineError> {
        let input = LayoutInput {
            description,
            language: self.options.language.label(),
        };
        let reply = AgentRunner::new("generate_layout", input, self.agents, self.models)
            .run(self.service)?
            .output;

        Ok(extract_fenced(&reply, self.options.language.format_label(), self.diagnostics))
    }

    pub fn refine(&self, layout: &str, description: &str, caption: &str) -> Result<LoopOutcome, PipelineError> {
        let input = RefineInput {
            diagram: layout,
            description,
            caption,
            language: self.options.language.label(),
        };
        self.run_phase(Phase::Refine, input, layout)
    }

    pub fn verify(&self, layout: &str) -> Result<LoopOutcome, PipelineError> {
        let input = VerifyInput {
            diagram: layout,
            language: self.options.language.label(),
        };
        self.run_phase(Phase::Verify, input, layout)
    }

    fn run_phase<T: Serialize>(&self, phase: Phase, input: T, layout: &str) -> Result<LoopOutcome, PipelineError> {
        let runner = AgentRunner::new(phase.agent_name(), input, self.agents, self.models);
        let prompt = runner.populate().map_err(AgentRunnerError::from)?.prompt;
        let model = runner.model().map_err(AgentRunnerError::from)?;

        RefinementLoop::new(phase, prompt, model, self.service, self.diagnostics)
            .with_format_label(self.options.language.format_label())
            .with_max_turns(self.options.max_turns)
            .run(layout)
            .map_err(|e| PipelineError::Agent(e.into()))
    }

    /// Drafts, refines and verifies a layout from a description
    pub fn generate(&self, description: &str, caption: &str) -> Result<GenerationOutcome, PipelineError> {
        let initial_layout = self.generate_initial_layout(description)?;
        let refinement = self.refine(&initial_layout, description, caption)?;
        let verification = self.verify(&refinement.content)?;

        Ok(GenerationOutcome {
            initial_layout,
            refinement,
            verification,
        })
    }

    /// Asks which asset source fits each placeholder.
    ///
    /// No placeholders means no plan and no service call. A reply that is
    /// not a JSON array is an error; individual malformed entries are skipped.
    pub fn plan_replacements(&self, diagram: &str, description: &str) -> Result<Vec<ReplacementPlanEntry>, PipelineError> {
        let placeholders = find_placeholders_in(diagram, self.diagnostics);
        if placeholders.is_empty() {
            self.diagnostics.info(COMPONENT, "No image placeholders to replace");
            return Ok(Vec::new());
        }

        let ids: Vec<&str> = placeholders.iter().map(|p| p.id.as_str()).collect();
        let input = PlanInput {
            description,
            image_ids: serde_json::to_string(&ids).unwrap_or_default(),
        };
        let reply = AgentRunner::new("plan_replacements", input, self.agents, self.models)
            .run(self.service)?
            .output;

        let plan_text = extract_fenced(&reply, PLAN_FORMAT_LABEL, self.diagnostics);
        let raw: Vec<serde_json::Value> =
            serde_json::from_str(&plan_text).map_err(|e| PipelineError::InvalidPlan(e.to_string()))?;

        let mut plan = Vec::with_capacity(raw.len());
        for entry in raw {
            match serde_json::from_value::<ReplacementPlanEntry>(entry) {
                Ok(entry) => plan.push(entry),
                Err(e) => self
                    .diagnostics
                    .warn(COMPONENT, &format!("Skipping malformed plan entry: {}", e)),
            }
        }

        Ok(filter_plan(plan, &placeholders, self.diagnostics))
    }

    /// Plans, resolves and applies image assets to a repaired diagram
    pub fn replace_components(
        &self,
        diagram: &str,
        description: &str,
        candidates: &[CandidateImage],
    ) -> Result<ReplacementOutcome, PipelineError> {
        let plan = self.plan_replacements(diagram, description)?;

        let provider = AgentAssetProvider::new(self.service, self.agents, self.models, self.diagnostics);
        let assets = resolve_assets(&plan, candidates, &provider, self.diagnostics)?;
        let diagram = apply_assets(diagram, &assets, self.diagnostics);

        Ok(ReplacementOutcome {
            diagram,
            plan,
            assets,
        })
    }

    /// Runs every stage for one sample.
    ///
    /// Repair and replacement apply to mxGraph documents only, and the
    /// repaired text is kept as the final layout. Other languages keep the
    /// verified layout as both final layout and final diagram.
    pub fn run(&self, sample: &Sample, candidates: &[CandidateImage]) -> Result<SampleRecord, PipelineError> {
        self.diagnostics.info(COMPONENT, &format!("Describing '{}'", sample.name));
        let description = self.describe(sample)?;

        self.diagnostics.info(COMPONENT, &format!("Generating layout for '{}'", sample.name));
        let generation = self.generate(&description, &sample.caption)?;
        let verified = generation.final_layout();

        let (final_layout, final_diagram, replacement_plan) = if self.options.language.is_mxgraph() {
            let repaired = repair_diagram(verified, self.diagnostics);
            let replaced = self.replace_components(&repaired, &description, candidates)?;
            (repaired, replaced.diagram, replaced.plan)
        } else {
            (verified.to_string(), verified.to_string(), Vec::new())
        };

        Ok(SampleRecord {
            caption: sample.caption.clone(),
            description,
            initial_layout: generation.initial_layout,
            final_layout,
            refinements: generation.refinement.replies,
            verifications: generation.verification.replies,
            replacement_plan,
            final_diagram,
            generated_at: chrono::Utc::now().to_rfc3339(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contexts::agent_runner::{ExecutionError, Model, PopulateError};
    use crate::data::{RecordingDiagnostics, Transcript};
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct Templates;

    impl AgentRegistry for Templates {
        fn get_specification(&self, agent_name: &str) -> Result<String, PopulateError> {
            let template = match agent_name {
                "describe_figure" => "describe {{input.caption}}",
                "generate_layout" => "layout in {{input.language}}",
                "refine_layout" => "refine {{input.diagram}}",
                "verify_layout" => "verify {{input.diagram}}",
                "plan_replacements" => "plan {{input.image_ids}}",
                "generate_svg" => "svg {{input.name}}",
                "search_author_image" => "search {{input.candidate_list}}",
                other => return Err(PopulateError::AgentNotFound(other.to_string())),
            };
            Ok(template.to_string())
        }
    }

    struct SingleModel;

    impl AgentModelRegistry for SingleModel {
        fn get_model(&self, agent_name: &str) -> Result<Model, ExecutionError> {
            Ok(Model {
                name: format!("model-{}", agent_name),
            })
        }
    }

    /// Answers by the first word of the seeding prompt
    struct RoutedService {
        replies: HashMap<&'static str, String>,
        seen: Mutex<Vec<String>>,
    }

    impl RoutedService {
        fn new(replies: &[(&'static str, &str)]) -> Self {
            Self {
                replies: replies.iter().map(|(k, v)| (*k, v.to_string())).collect(),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn calls_to(&self, route: &str) -> usize {
            self.seen.lock().unwrap().iter().filter(|r| r.as_str() == route).count()
        }
    }

    impl GenerationService for RoutedService {
        fn invoke(&self, _model: &Model, transcript: &Transcript) -> Result<String, ExecutionError> {
            let prompt = &transcript.messages()[0].content;
            let route = prompt.split_whitespace().next().unwrap_or_default().to_string();
            self.seen.lock().unwrap().push(route.clone());
            self.replies
                .get(route.as_str())
                .cloned()
                .ok_or_else(|| ExecutionError::ExecutionFailed(format!("no reply for {}", route)))
        }
    }

    const LAYOUT: &str = r#"<mxGraphModel><root><mxCell id="a" vertex="1"/><mxCell id="icon1" value="Bot" style="shape=image;" vertex="1"><mxGeometry width="40" height="40"/></mxCell></root></mxGraphModel>"#;

    fn sample() -> Sample {
        Sample {
            name: "paper".to_string(),
            paper: "Title: Paper\n".to_string(),
            caption: "Figure 1".to_string(),
        }
    }

    fn drawio_service() -> RoutedService {
        let layout_reply = format!("```xml\n{}\n```", LAYOUT);
        RoutedService::new(&[
            ("describe", "<description>A bot</description>"),
            ("layout", &layout_reply),
            ("refine", "<decision>no</decision>"),
            ("verify", "<decision>no</decision>"),
            (
                "plan",
                "```json\n[{\"source\":\"svg\",\"description\":\"robot\",\"id\":\"icon1\",\"name\":\"bot\"},{\"source\":\"svg\",\"description\":\"x\",\"id\":\"ghost\",\"name\":\"x\"}]\n```",
            ),
            ("svg", "```svg\n<svg/>\n```"),
        ])
    }

    #[test]
    fn test_run_produces_repaired_and_replaced_diagram() {
        let service = drawio_service();
        let diagnostics = RecordingDiagnostics::new();
        let pipeline = DiagramPipeline::new(&service, &Templates, &SingleModel, &diagnostics, PipelineOptions::default());

        let record = pipeline.run(&sample(), &[]).unwrap();

        assert_eq!(record.description, "A bot");
        assert_eq!(record.initial_layout, LAYOUT);
        assert_ne!(record.final_layout, LAYOUT);
        assert!(record.final_layout.contains(r#"id="0""#));
        assert!(record.final_layout.contains("Bot"));
        assert_eq!(record.refinements.len(), 1);
        assert_eq!(record.verifications.len(), 1);
        assert_eq!(record.replacement_plan.len(), 1);
        assert_eq!(record.replacement_plan[0].width.as_deref(), Some("40"));
        assert!(record.final_diagram.contains(r#"id="0""#));
        assert!(record.final_diagram.contains("image=data:image/svg+xml,PHN2Zy8+"));
        assert!(!record.final_diagram.contains("Bot"));
        assert_eq!(service.calls_to("svg"), 1);
    }

    #[test]
    fn test_non_mxgraph_language_skips_replacement() {
        let service = RoutedService::new(&[
            ("describe", "<description>flow</description>"),
            ("layout", "```mermaid\ngraph TD; A-->B\n```"),
            ("refine", "<decision>no</decision>"),
            ("verify", "<decision>no</decision>"),
        ]);
        let diagnostics = RecordingDiagnostics::new();
        let options = PipelineOptions {
            language: DiagramLanguage::Mermaid,
            max_turns: 2,
        };
        let pipeline = DiagramPipeline::new(&service, &Templates, &SingleModel, &diagnostics, options);

        let record = pipeline.run(&sample(), &[]).unwrap();

        assert_eq!(record.final_diagram, "graph TD; A-->B");
        assert_eq!(record.final_layout, "graph TD; A-->B");
        assert!(record.replacement_plan.is_empty());
        assert_eq!(service.calls_to("plan"), 0);
    }

    #[test]
    fn test_invalid_plan_fails_sample() {
        let layout_reply = format!("```xml\n{}\n```", LAYOUT);
        let service = RoutedService::new(&[
            ("describe", "<description>A bot</description>"),
            ("layout", &layout_reply),
            ("refine", "<decision>no</decision>"),
            ("verify", "<decision>no</decision>"),
            ("plan", "I cannot decide."),
        ]);
        let diagnostics = RecordingDiagnostics::new();
        let pipeline = DiagramPipeline::new(&service, &Templates, &SingleModel, &diagnostics, PipelineOptions::default());

        assert!(matches!(pipeline.run(&sample(), &[]), Err(PipelineError::InvalidPlan(_))));
    }

    #[test]
    fn test_service_failure_fails_sample() {
        let service = RoutedService::new(&[("describe", "<description>A bot</description>")]);
        let diagnostics = RecordingDiagnostics::new();
        let pipeline = DiagramPipeline::new(&service, &Templates, &SingleModel, &diagnostics, PipelineOptions::default());

        assert!(matches!(
            pipeline.run(&sample(), &[]),
            Err(PipelineError::Agent(AgentRunnerError::Execution(_)))
        ));
    }

    #[test]
    fn test_plan_with_numeric_id_and_malformed_entry() {
        let service = RoutedService::new(&[(
            "plan",
            "```json\n[{\"source\":\"svg\",\"description\":\"robot\",\"id\":5,\"name\":\"bot\"},{\"source\":\"svg\",\"name\":\"no id\"}]\n```",
        )]);
        let diagnostics = RecordingDiagnostics::new();
        let pipeline = DiagramPipeline::new(&service, &Templates, &SingleModel, &diagnostics, PipelineOptions::default());
        let diagram = r#"<mxGraphModel><root><mxCell id="0"/><mxCell id="1" parent="0"/><mxCell id="5" value="Bot" style="shape=image;" vertex="1" parent="1"><mxGeometry width="30" height="20"/></mxCell></root></mxGraphModel>"#;

        let plan = pipeline.plan_replacements(diagram, "desc").unwrap();

        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].id, "5");
        assert_eq!(plan[0].width.as_deref(), Some("30"));
        assert!(diagnostics.has_warning_from("diagram_pipeline"));
    }

    #[test]
    fn test_plan_without_placeholders_makes_no_call() {
        let service = RoutedService::new(&[]);
        let diagnostics = RecordingDiagnostics::new();
        let pipeline = DiagramPipeline::new(&service, &Templates, &SingleModel, &diagnostics, PipelineOptions::default());

        let plan = pipeline
            .plan_replacements("<mxGraphModel><root/></mxGraphModel>", "desc")
            .unwrap();
        assert!(plan.is_empty());
        assert!(service.seen.lock().unwrap().is_empty());
    }
}
