//! Drives the full pipeline through the bundled agent templates with a
//! scripted generation service.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::thread;

use figsmith::contexts::{
    AgentModelRegistry, DiagramPipeline, ExecutionError, GenerationService, Model, PipelineError,
    PipelineOptions, find_placeholders_in,
};
use figsmith::data::{
    AssetSource, CandidateImage, DiagramLanguage, RecordingDiagnostics, Role, Sample, Transcript,
};
use figsmith::registries::{FileAgentModelRegistry, FileAgentRegistry};

/// Phrases identifying each bundled template's prompt
const ROUTES: [(&str, &str); 7] = [
    ("designing and describing", "describe"),
    ("conceptual diagram", "layout"),
    ("evaluating a scientific figure", "refine"),
    ("know its rules", "verify"),
    ("information extraction", "plan"),
    ("svg designer", "svg"),
    ("matching an image", "search"),
];

fn route_of(transcript: &Transcript) -> &'static str {
    let prompt = &transcript.messages()[0].content;
    ROUTES
        .iter()
        .find(|(phrase, _)| prompt.contains(phrase))
        .map(|(_, route)| *route)
        .unwrap_or("unknown")
}

/// Answers by template; refine replies are consumed in order
struct ScriptedService {
    replies: HashMap<&'static str, String>,
    refine_replies: Mutex<Vec<String>>,
    log: Mutex<Vec<(&'static str, Transcript)>>,
}

impl ScriptedService {
    fn new(layout: &str, refine_replies: Vec<String>) -> Self {
        let mut replies = HashMap::new();
        replies.insert("describe", "<description>\nA robot beside a chart.\n</description>".to_string());
        replies.insert("layout", format!("Here it is:\n```xml\n{}\n```", layout));
        replies.insert("verify", "<decision>no</decision>".to_string());
        replies.insert(
            "plan",
            r#"```json
[
  {"source": "svg", "description": "friendly robot", "id": "robot", "name": "Robot"},
  {"source": "author", "description": "accuracy chart", "id": "chart", "name": "Chart"}
]
```"#
                .to_string(),
        );
        replies.insert("svg", "```svg\n<svg width=\"40\"/>\n```".to_string());
        replies.insert("search", "1".to_string());

        Self {
            replies,
            refine_replies: Mutex::new(refine_replies.into_iter().rev().collect()),
            log: Mutex::new(Vec::new()),
        }
    }

    fn calls_to(&self, route: &str) -> usize {
        self.log.lock().unwrap().iter().filter(|(r, _)| *r == route).count()
    }
}

impl GenerationService for ScriptedService {
    fn invoke(&self, _model: &Model, transcript: &Transcript) -> Result<String, ExecutionError> {
        let route = route_of(transcript);
        self.log.lock().unwrap().push((route, transcript.clone()));

        if route == "refine" {
            return Ok(self
                .refine_replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| "<decision>no</decision>".to_string()));
        }

        self.replies
            .get(route)
            .cloned()
            .ok_or_else(|| ExecutionError::ExecutionFailed(format!("unscripted route {}", route)))
    }
}

/// Fails every call to one route
struct FailingService {
    inner: ScriptedService,
    failing_route: &'static str,
}

impl GenerationService for FailingService {
    fn invoke(&self, model: &Model, transcript: &Transcript) -> Result<String, ExecutionError> {
        if route_of(transcript) == self.failing_route {
            return Err(ExecutionError::ExecutionFailed("timed out".to_string()));
        }
        self.inner.invoke(model, transcript)
    }
}

const DRAFT: &str = r#"<mxGraphModel><root><mxCell id="robot" value="Robot" style="shape=image;" vertex="1"><mxGeometry x="10" y="10" width="40" height="40"/></mxCell></root></mxGraphModel>"#;

const REVISED: &str = r#"<mxGraphModel><root><mxCell id="0"/><mxCell id="1" parent="0"/><mxCell id="robot" value="Robot" style="shape=image;" vertex="1" parent="1"><mxGeometry x="10" y="10" width="40" height="40"/><mxGeometry x="99" y="99" width="1" height="1"/></mxCell><mxCell id="chart" value="Acc &amp; loss" style="shape=image;" vertex="1"><mxGeometry x="80" y="10" width="60" height="30" as="geometry"/></mxCell></root></mxGraphModel>"#;

fn agents_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("agents")
}

fn registries() -> (FileAgentRegistry, FileAgentModelRegistry) {
    (
        FileAgentRegistry::new(Some(agents_dir())),
        FileAgentModelRegistry::new(Some(agents_dir().join("agent_model_registry.yml")), None),
    )
}

fn sample(name: &str) -> Sample {
    Sample {
        name: name.to_string(),
        paper: "Title: Robots\nAbstract: We chart accuracy.\n".to_string(),
        caption: "Figure 1: overview".to_string(),
    }
}

fn candidates() -> Vec<CandidateImage> {
    vec![
        CandidateImage {
            name: "photo".to_string(),
            mime_type: "image/jpg".to_string(),
            payload: "cGhvdG8=".to_string(),
        },
        CandidateImage {
            name: "accuracy".to_string(),
            mime_type: "image/png".to_string(),
            payload: "YWNjdXJhY3k=".to_string(),
        },
    ]
}

#[test]
fn test_full_pipeline_with_bundled_agents() {
    let revision = format!("<decision>yes</decision>\n```xml\n{}\n```", REVISED);
    let service = ScriptedService::new(DRAFT, vec![revision]);
    let (agents, models) = registries();
    let diagnostics = RecordingDiagnostics::new();

    let pipeline = DiagramPipeline::new(&service, &agents, &models, &diagnostics, PipelineOptions::default());
    let record = pipeline.run(&sample("p1"), &candidates()).unwrap();

    assert_eq!(record.caption, "Figure 1: overview");
    assert_eq!(record.description, "A robot beside a chart.");
    assert_eq!(record.initial_layout, DRAFT);
    // the persisted final layout is the repaired revision
    assert_ne!(record.final_layout, REVISED);
    assert!(record.final_layout.contains(r#"id="chart""#));
    assert!(!record.final_layout.contains(r#"x="99""#));
    assert!(!record.final_layout.contains("image=data:"));
    assert_eq!(record.refinements.len(), 2);
    assert_eq!(record.verifications.len(), 1);

    // both placeholders were planned and enriched
    assert_eq!(record.replacement_plan.len(), 2);
    let chart = record.replacement_plan.iter().find(|e| e.id == "chart").unwrap();
    assert_eq!(chart.source, AssetSource::Author);
    assert_eq!(chart.width.as_deref(), Some("60"));
    assert_eq!(chart.value.as_deref(), Some("Acc & loss"));

    let final_diagram = &record.final_diagram;
    assert!(final_diagram.contains("image=data:image/png,YWNjdXJhY3k="));
    assert!(final_diagram.contains("image=data:image/svg+xml,"));
    assert!(!final_diagram.contains(r#"x="99""#));
    assert!(find_placeholders_in(final_diagram, &diagnostics)
        .iter()
        .all(|p| p.value.is_empty()));

    assert_eq!(service.calls_to("search"), 1);
    assert_eq!(service.calls_to("svg"), 1);
}

#[test]
fn test_refine_follow_up_carries_previous_reply() {
    let first = format!("<decision>yes</decision>\n```xml\n{}\n```", DRAFT);
    let service = ScriptedService::new(DRAFT, vec![first.clone(), "<decision>no</decision>".to_string()]);
    let (agents, models) = registries();
    let diagnostics = RecordingDiagnostics::new();

    let pipeline = DiagramPipeline::new(&service, &agents, &models, &diagnostics, PipelineOptions::default());
    pipeline.run(&sample("p1"), &[]).unwrap();

    let log = service.log.lock().unwrap();
    let refine_turns: Vec<&Transcript> = log.iter().filter(|(r, _)| *r == "refine").map(|(_, t)| t).collect();
    assert_eq!(refine_turns.len(), 2);
    assert_eq!(refine_turns[0].len(), 1);

    let second = refine_turns[1].messages();
    assert_eq!(second.len(), 3);
    assert!(second[0].content.contains(DRAFT));
    assert_eq!(second[1].role, Role::Assistant);
    assert_eq!(second[1].content, first);
    assert!(second[2].content.starts_with("Is there any improvement"));
}

#[test]
fn test_turn_cap_bounds_refinement() {
    let revision = format!("<decision>yes</decision>\n```xml\n{}\n```", DRAFT);
    let service = ScriptedService::new(DRAFT, vec![revision; 10]);
    let (agents, models) = registries();
    let diagnostics = RecordingDiagnostics::new();
    let options = PipelineOptions {
        language: DiagramLanguage::Drawio,
        max_turns: 2,
    };

    let pipeline = DiagramPipeline::new(&service, &agents, &models, &diagnostics, options);
    let record = pipeline.run(&sample("p1"), &[]).unwrap();

    assert_eq!(record.refinements.len(), 2);
    assert_eq!(service.calls_to("refine"), 2);
}

#[test]
fn test_service_failure_is_fatal_for_sample() {
    let service = FailingService {
        inner: ScriptedService::new(DRAFT, vec![]),
        failing_route: "verify",
    };
    let (agents, models) = registries();
    let diagnostics = RecordingDiagnostics::new();

    let pipeline = DiagramPipeline::new(&service, &agents, &models, &diagnostics, PipelineOptions::default());
    let result = pipeline.run(&sample("p1"), &[]);

    assert!(matches!(result, Err(PipelineError::Agent(_))));
    assert_eq!(service.inner.calls_to("plan"), 0);
}

#[test]
fn test_samples_run_independently_in_parallel() {
    let (agents, models) = registries();

    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let agents = &agents;
                let models = &models;
                scope.spawn(move || {
                    let service: Box<dyn GenerationService> = if i == 2 {
                        Box::new(FailingService {
                            inner: ScriptedService::new(DRAFT, vec![]),
                            failing_route: "describe",
                        })
                    } else {
                        Box::new(ScriptedService::new(DRAFT, vec![]))
                    };
                    let diagnostics = RecordingDiagnostics::new();
                    let pipeline = DiagramPipeline::new(
                        service.as_ref(),
                        agents,
                        models,
                        &diagnostics,
                        PipelineOptions::default(),
                    );
                    pipeline.run(&sample(&format!("p{}", i)), &[])
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 3);
    assert!(results[2].is_err());
    for result in results.iter().flatten() {
        assert!(result.final_diagram.contains("image=data:image/svg+xml,"));
    }
}

#[test]
fn test_model_registry_covers_bundled_agents() {
    let (_, models) = registries();
    for agent in ["describe_figure", "generate_layout", "refine_layout", "verify_layout"] {
        assert!(!models.get_model(agent).unwrap().name.is_empty());
    }
}
