//! Model question documents
//!
//! Access is decided here, at the serving boundary, for both the listing and the documents
//! themselves - hiding a link in the listing does not protect the document.

use std::io;

use actix_web::http::header::{self, CacheControl, CacheDirective, ContentType};
use actix_web::web::{Data, Path, ReqData};
use actix_web::{HttpRequest, HttpResponse, get};
use serde::Serialize;
use subscriptions::Decision;
use tracing::debug;

use crate::auth::Session;
use crate::error::Error;
use crate::model::Model;

/// Listing entry
#[derive(Debug, Serialize)]
struct Question {
    id: u32,
    title: String,
    free: bool,
    access: Decision,
    /// Only present when the caller may open the document
    #[serde(skip_serializing_if = "Option::is_none")]
    href: Option<String>,
}

fn document_href(id: u32) -> String {
    format!("/model-questions/model-{id}.html")
}

/// Lists documents with the caller's access to each
#[get("/api/questions")]
pub async fn questions(model: Data<Model>, session: Option<ReqData<Session>>) -> HttpResponse {
    let session = session.map(ReqData::into_inner);
    let gate = model.gate();

    let questions: Vec<_> = (1..=gate.count())
        .map(|id| {
            let access = model.decide(id, session.as_ref());
            Question {
                id,
                title: format!("Model Question {id}"),
                free: gate.is_free(id),
                access,
                href: (access == Decision::Allow).then(|| document_href(id)),
            }
        })
        .collect();

    HttpResponse::Ok().json(serde_json::json!({ "questions": questions }))
}

/// Serves a document if the caller may see it, redirects otherwise
#[get("/model-questions/model-{id:\\d+}.html")]
pub async fn document(
    req: HttpRequest,
    model: Data<Model>,
    session: Option<ReqData<Session>>,
    id: Path<u32>,
) -> Result<HttpResponse, Error> {
    let id = id.into_inner();
    if !model.gate().exists(id) {
        return Err(Error::DocumentNotFound(id));
    }

    let session = session.map(ReqData::into_inner);
    let decision = model.decide(id, session.as_ref());
    debug!(
        id,
        username = session.as_ref().map(|session| session.username.as_str()),
        ?decision,
        "Document access"
    );

    let content = model.content();
    match decision {
        Decision::Allow => {}
        Decision::RedirectLogin => {
            let location = format!(
                "{}?redirect={}",
                content.login_page,
                urlencoding::encode(req.path())
            );
            return Ok(redirect(&location));
        }
        Decision::RedirectRenew => return Ok(redirect(&content.renew_page)),
    }

    let path = content.dir.join(format!("model-{id}.html"));
    let body = match tokio::fs::read(&path).await {
        Ok(body) => body,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(Error::DocumentNotFound(id));
        }
        Err(err) => {
            return Err(Error::Internal(format!(
                "Cannot read {}: {err}",
                path.display()
            )));
        }
    };

    // Gated documents must not end up in shared caches
    let cache = if model.gate().is_free(id) {
        CacheControl(vec![CacheDirective::Public, CacheDirective::MaxAge(3600)])
    } else {
        CacheControl(vec![CacheDirective::Private, CacheDirective::NoStore])
    };

    Ok(HttpResponse::Ok()
        .content_type(ContentType::html())
        .insert_header(cache)
        .body(body))
}

fn redirect(location: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, location))
        .insert_header(CacheControl(vec![CacheDirective::NoStore]))
        .finish()
}
