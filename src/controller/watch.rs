//! Decoding a stream of watch documents.
//!
//! Accepts what `kubectl get applications -A -w -o json --output-watch-events`
//! prints: a sequence of JSON documents, each a watch event, a `List`, or a
//! bare `Application`.

use std::io::{self, Read};

use serde::Deserialize;
use tracing::debug;

use crate::model::Application;

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("failed to decode watch document: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("failed to read watch stream: {0}")]
    Io(#[from] io::Error),
}

impl From<serde_json::Error> for WatchError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() {
            Self::Io(e.into())
        } else {
            Self::Decode(e)
        }
    }
}

/// A change to one application.
#[derive(Debug, Clone, PartialEq)]
pub enum Observed {
    Upsert(Application),
    Deleted(Application),
}

#[derive(Debug, Deserialize)]
struct WatchEvent {
    #[serde(rename = "type")]
    event_type: String,
    object: Application,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Document {
    Event(WatchEvent),
    List { items: Vec<Application> },
    Object(Application),
}

/// Feeds every change in `reader` to `sink`, in stream order.
pub fn for_each_observed<R: Read>(
    reader: R,
    mut sink: impl FnMut(Observed),
) -> Result<(), WatchError> {
    let documents = serde_json::Deserializer::from_reader(reader).into_iter::<Document>();
    for document in documents {
        match document? {
            Document::Event(event) => match event.event_type.as_str() {
                "ADDED" | "MODIFIED" => sink(Observed::Upsert(event.object)),
                "DELETED" => sink(Observed::Deleted(event.object)),
                other => debug!(event_type = other, "ignoring watch event"),
            },
            Document::List { items } => items.into_iter().map(Observed::Upsert).for_each(&mut sink),
            Document::Object(app) => sink(Observed::Upsert(app)),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(input: &str) -> Vec<Observed> {
        let mut seen = Vec::new();
        for_each_observed(input.as_bytes(), |o| seen.push(o)).unwrap();
        seen
    }

    fn name(observed: &Observed) -> (&'static str, &str) {
        match observed {
            Observed::Upsert(app) => ("upsert", &app.metadata.name),
            Observed::Deleted(app) => ("deleted", &app.metadata.name),
        }
    }

    #[test]
    fn decodes_watch_events() {
        let input = r#"
            {"type":"ADDED","object":{"metadata":{"namespace":"argocd","name":"app1"}}}
            {"type":"MODIFIED","object":{"metadata":{"namespace":"argocd","name":"app1"},
             "status":{"health":{"status":"Healthy"}}}}
            {"type":"BOOKMARK","object":{"metadata":{}}}
            {"type":"DELETED","object":{"metadata":{"namespace":"argocd","name":"app1"}}}
        "#;
        let seen = collect(input);
        let names: Vec<_> = seen.iter().map(name).collect();
        assert_eq!(
            names,
            [("upsert", "app1"), ("upsert", "app1"), ("deleted", "app1")]
        );
    }

    #[test]
    fn decodes_lists_and_bare_objects() {
        let input = r#"
            {"apiVersion":"v1","kind":"List","items":[
              {"metadata":{"namespace":"argocd","name":"a"}},
              {"metadata":{"namespace":"argocd","name":"b"}}
            ]}
            {"kind":"Application","metadata":{"namespace":"argocd","name":"c"}}
        "#;
        let names: Vec<_> = collect(input).iter().map(|o| name(o).1.to_string()).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn malformed_document_is_a_decode_error() {
        let err = for_each_observed("{\"type\": ".as_bytes(), |_| {}).unwrap_err();
        assert!(matches!(err, WatchError::Decode(_)));
    }
}
