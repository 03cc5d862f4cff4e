use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt};

use crate::Result;
use crate::error::Error;

const DEFAULT_FILTER: &str = "desknotify=info";
const DEBUG_FILTER: &str = "desknotify=debug";

/// Choisit le filtre explicite : celui de la ligne de commande, sinon le
/// niveau debug quand `notify.debug` est activé.
pub fn explicit_filter(requested: Option<&str>, debug: bool) -> Option<&str> {
    requested.or_else(|| debug.then_some(DEBUG_FILTER))
}

/// Initialise tracing avec un filtre optionnel et un mode JSON conditionnel.
///
/// Ordre de priorité : `explicit_filter`, puis `RUST_LOG`, puis
/// `desknotify=info`. Les callbacks natifs arrivent sur des threads de la
/// plateforme, d'où les noms de threads dans chaque ligne.
///
/// # Errors
///
/// Retourne une erreur si aucun filtre candidat n'est valide, si la couche JSON
/// est demandée alors que la fonctionnalité n'est pas compilée, ou si un
/// subscriber global est déjà installé.
pub fn init_tracing(explicit_filter: Option<&str>, use_json: bool) -> Result<()> {
    let filter = [
        explicit_filter.map(str::to_string),
        std::env::var("RUST_LOG").ok(),
        Some(DEFAULT_FILTER.to_string()),
    ]
    .into_iter()
    .flatten()
    .find_map(|candidate| EnvFilter::try_new(candidate).ok())
    .ok_or_else(|| Error::Telemetry("invalid log filter".to_string()))?;

    #[cfg(feature = "json-logs")]
    if use_json {
        let subscriber = Registry::default().with(filter).with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_names(true)
                .json()
                .flatten_event(true),
        );
        return tracing::subscriber::set_global_default(subscriber)
            .map_err(|err| Error::Telemetry(err.to_string()));
    }

    #[cfg(not(feature = "json-logs"))]
    if use_json {
        return Err(Error::Telemetry(
            "binary was built without the `json-logs` feature".to_string(),
        ));
    }

    let subscriber = Registry::default().with(filter).with(
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true),
    );
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|err| Error::Telemetry(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::explicit_filter;

    #[test]
    fn command_line_filter_beats_the_debug_switch() {
        assert_eq!(explicit_filter(Some("warn"), true), Some("warn"));
        assert_eq!(explicit_filter(None, true), Some("desknotify=debug"));
        assert_eq!(explicit_filter(None, false), None);
    }
}
