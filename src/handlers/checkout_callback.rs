use actix_web::{HttpResponse, web};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::oneshot;

use crate::error::{AppError, AppResult};
use crate::models::{CheckoutOptions, CheckoutOutcome, CheckoutSuccess};
use crate::utils::is_cancellation;

/// One open checkout served by the loopback agent.
pub struct CheckoutSession {
    pub options: CheckoutOptions,
    pub hosted_url: String,
    pub callback_url: String,
    pub cancel_url: String,
    outcome_tx: Mutex<Option<oneshot::Sender<CheckoutOutcome>>>,
}

impl CheckoutSession {
    pub fn new(
        options: CheckoutOptions,
        hosted_url: String,
        callback_url: String,
        cancel_url: String,
    ) -> (Self, oneshot::Receiver<CheckoutOutcome>) {
        let (tx, rx) = oneshot::channel();
        let session = Self {
            options,
            hosted_url,
            callback_url,
            cancel_url,
            outcome_tx: Mutex::new(Some(tx)),
        };
        (session, rx)
    }

    /// Delivers the outcome to the waiting agent. Only the first call wins.
    pub fn complete(&self, outcome: CheckoutOutcome) -> bool {
        let sender = match self.outcome_tx.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match sender {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }
}

/// Maps the gateway's redirect form onto a checkout outcome.
pub fn outcome_from_callback(form: &HashMap<String, String>) -> AppResult<CheckoutOutcome> {
    if let Some(payment_id) = form.get("razorpay_payment_id") {
        return Ok(CheckoutOutcome::Completed(CheckoutSuccess {
            payment_id: Some(payment_id.clone()),
            subscription_id: form.get("razorpay_subscription_id").cloned(),
            signature: form.get("razorpay_signature").cloned(),
        }));
    }

    // error[code]=...&error[description]=...&error[metadata]={...}
    let mut error = Map::new();
    for (key, value) in form {
        if let Some(field) = key
            .strip_prefix("error[")
            .and_then(|rest| rest.strip_suffix(']'))
        {
            let value = if field == "metadata" {
                serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.clone()))
            } else {
                Value::String(value.clone())
            };
            error.insert(field.to_string(), value);
        }
    }

    if error.is_empty() {
        return Err(AppError::ValidationError(
            "Callback carried neither a payment id nor an error".to_string(),
        ));
    }

    let mut raw = Map::new();
    raw.insert("error".to_string(), Value::Object(error));
    let raw = Value::Object(raw);
    if is_cancellation(&raw) {
        Ok(CheckoutOutcome::Cancelled)
    } else {
        Ok(CheckoutOutcome::Failed(raw))
    }
}

fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Auto-submitting form that hands the browser over to the hosted checkout.
pub fn render_checkout_page(session: &CheckoutSession) -> String {
    let options = &session.options;
    let mut fields = vec![
        ("key_id", options.key.clone()),
        ("subscription_id", options.subscription_id.clone()),
        ("name", options.name.clone()),
        ("description", options.description.clone()),
        ("callback_url", session.callback_url.clone()),
        ("cancel_url", session.cancel_url.clone()),
        ("theme[color]", options.theme_color.clone()),
    ];
    let prefill = [
        ("prefill[name]", &options.prefill.name),
        ("prefill[email]", &options.prefill.email),
        ("prefill[contact]", &options.prefill.contact),
    ];
    for (name, value) in prefill {
        if let Some(value) = value {
            fields.push((name, value.clone()));
        }
    }

    let inputs: String = fields
        .iter()
        .map(|(name, value)| {
            format!(
                "<input type=\"hidden\" name=\"{}\" value=\"{}\">",
                escape_html(name),
                escape_html(value)
            )
        })
        .collect::<Vec<_>>()
        .join("\n      ");

    format!(
        r#"<!DOCTYPE html>
<html>
  <head><meta charset="utf-8"><title>{title}</title></head>
  <body onload="document.forms[0].submit()">
    <form method="POST" action="{action}">
      {inputs}
      <button type="submit" style="background:{color};color:#fff;border:0;padding:12px 24px">Continue to payment</button>
    </form>
  </body>
</html>"#,
        title = escape_html(&options.name),
        action = escape_html(&session.hosted_url),
        color = escape_html(&options.theme_color),
    )
}

fn finished_page(message: &str) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(format!(
            "<!DOCTYPE html><html><body><p>{}</p><p>You can return to the app.</p></body></html>",
            escape_html(message)
        ))
}

pub async fn checkout_page(session: web::Data<CheckoutSession>) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(render_checkout_page(&session))
}

pub async fn checkout_callback(
    session: web::Data<CheckoutSession>,
    form: web::Form<HashMap<String, String>>,
) -> AppResult<HttpResponse> {
    let outcome = outcome_from_callback(&form)?;
    let message = match &outcome {
        CheckoutOutcome::Completed(_) => "Payment received. We are confirming your subscription.",
        CheckoutOutcome::Cancelled => "Payment cancelled.",
        CheckoutOutcome::Failed(_) => "Payment failed.",
    };

    if !session.complete(outcome) {
        log::warn!("Checkout callback arrived after the session was closed");
    }
    Ok(finished_page(message))
}

pub async fn checkout_cancel(session: web::Data<CheckoutSession>) -> HttpResponse {
    session.complete(CheckoutOutcome::Cancelled);
    finished_page("Payment cancelled.")
}

pub fn checkout_callback_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/checkout")
            .route("", web::get().to(checkout_page))
            .route("/callback", web::post().to(checkout_callback))
            .route("/cancel", web::get().to(checkout_cancel)),
    );
}
