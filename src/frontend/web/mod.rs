//! Web button panel: one page of large buttons and a JSON endpoint that runs
//! the button's action.

use std::io;
use std::sync::Arc;

use actix_web::{
    App, HttpResponse, HttpServer, Responder, get, post,
    web::{self, Data, Path},
};
use serde::Serialize;
use tera::{Context, Tera};
use tokio::task::{self, JoinHandle};
use tracing::{error, info};

use super::{Target, describe_error, execute};
use crate::config::{WebButtonConfig, WebConfig};
use crate::engine::MacroRunner;
use crate::error::{ConfigError, EngineError};

const INDEX_TEMPLATE: &str = include_str!("../../../templates/index.html");

#[derive(Debug, Clone, Serialize)]
pub struct PanelButton {
    pub label: String,
    pub action: String,
    pub color: String,
}

#[derive(Debug, Serialize)]
struct ActionResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ActionResponse {
    fn ok(message: String) -> Self {
        Self {
            status: "ok",
            message: Some(message),
            error: None,
        }
    }

    fn error(status: &'static str, error: String) -> Self {
        Self {
            status,
            message: None,
            error: Some(error),
        }
    }
}

pub struct WebState {
    tera: Tera,
    buttons: Vec<PanelButton>,
    runner: Arc<dyn MacroRunner>,
}

impl WebState {
    /// Every button must point at a built-in or a configured macro; a bad
    /// button stops startup.
    pub fn new(config: &WebConfig, runner: Arc<dyn MacroRunner>) -> Result<Self, ConfigError> {
        let buttons = resolve_buttons(&config.buttons, &runner.macro_names())?;

        let mut tera = Tera::default();
        tera.add_raw_template("index.html", INDEX_TEMPLATE)
            .map_err(|e| ConfigError::Invalid(format!("web template: {}", e)))?;

        Ok(Self {
            tera,
            buttons,
            runner,
        })
    }
}

fn resolve_buttons(
    buttons: &[WebButtonConfig],
    known: &[String],
) -> Result<Vec<PanelButton>, ConfigError> {
    buttons
        .iter()
        .map(|button| {
            Target::resolve(&button.action, known).map_err(|_| {
                ConfigError::Invalid(format!(
                    "web button '{}' refers to unknown action '{}'",
                    button.label, button.action
                ))
            })?;
            Ok(PanelButton {
                label: button.label.clone(),
                action: button.action.clone(),
                color: button.color.clone(),
            })
        })
        .collect()
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(index).service(trigger_action);
}

/// Serve on a blocking thread with its own actix system, alongside the
/// tokio runtime used by the rest of the process.
pub fn start(state: WebState, host: String, port: u16) -> JoinHandle<io::Result<()>> {
    task::spawn_blocking(move || {
        info!("Starting web server on http://{}:{}", host, port);
        let sys = actix_rt::System::new();
        let state = Data::new(state);
        sys.block_on(async move {
            HttpServer::new(move || App::new().app_data(state.clone()).configure(configure))
                .bind((host.as_str(), port))?
                .run()
                .await
        })
    })
}

#[get("/")]
async fn index(state: Data<WebState>) -> impl Responder {
    let count = state.buttons.len();
    let mut context = Context::new();
    context.insert("buttons", &state.buttons);
    context.insert("cols", &if count > 1 { 2 } else { 1 });
    context.insert("rows", &count.div_ceil(2).max(1));
    context.insert("total_buttons", &count.max(1));

    match state.tera.render("index.html", &context) {
        Ok(html) => HttpResponse::Ok()
            .content_type("text/html; charset=utf-8")
            .body(html),
        Err(e) => {
            error!("Failed to render panel: {}", e);
            HttpResponse::InternalServerError().body("Failed to render page")
        }
    }
}

#[post("/api/action/{name}")]
async fn trigger_action(state: Data<WebState>, name: Path<String>) -> impl Responder {
    let name = name.into_inner();
    info!("Web request: execute '{}'", name);

    let target = Target::parse(&name);
    let runner = state.runner.clone();
    let result = web::block(move || execute(runner.as_ref(), &target)).await;

    match result {
        Ok(Ok(completion)) if completion.is_success() => {
            HttpResponse::Ok().json(ActionResponse::ok(completion.message()))
        }
        Ok(Ok(completion)) => {
            HttpResponse::BadGateway().json(ActionResponse::error("error", completion.message()))
        }
        Ok(Err(e @ EngineError::UnknownMacro(_))) => {
            HttpResponse::NotFound().json(ActionResponse::error("error", describe_error(&e)))
        }
        Ok(Err(EngineError::Busy)) => HttpResponse::TooManyRequests()
            .json(ActionResponse::error("busy", describe_error(&EngineError::Busy))),
        Ok(Err(e)) => {
            HttpResponse::BadGateway().json(ActionResponse::error("error", describe_error(&e)))
        }
        Err(e) => {
            error!("Web action worker failed: {}", e);
            HttpResponse::InternalServerError()
                .json(ActionResponse::error("error", "Action failed".to_string()))
        }
    }
}
