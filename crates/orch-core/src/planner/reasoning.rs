use crate::domain::DeploymentIntent;

/// A coarse, human-readable classification of the intent, attached to the
/// plan's `reasoning` field. Purely cosmetic: it does not influence step
/// generation or ordering.
pub fn summarize(intent: &DeploymentIntent) -> String {
    let deployment_type = classify(intent);
    format!(
        "classified as {deployment_type} targeting {} provider(s) in {} environment; \
         {} resource(s) specified",
        intent.target_providers.len(),
        intent.environment,
        intent.resources.len()
    )
}

fn classify(intent: &DeploymentIntent) -> &'static str {
    let text = intent.description.to_lowercase();
    if text.contains("database") || text.contains("db cluster") {
        "database cluster"
    } else if text.contains("web") || text.contains("app") {
        "web application"
    } else if text.contains("queue") || text.contains("stream") {
        "messaging pipeline"
    } else {
        "general infrastructure"
    }
}
