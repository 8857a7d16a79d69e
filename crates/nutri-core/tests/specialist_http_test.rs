//! Specialists talking to stub generation providers over HTTP.

use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use nutri_core::{Condition, NutriSettings, SpecialistBackend, SpecialistRegistry, SpecialistSettings};
use nutri_test_utils::{capturing, failing, provider_router, spawn};
use serde_json::json;

fn backend(condition: Condition, url: String) -> SpecialistBackend {
    let settings = SpecialistSettings {
        url,
        timeout: Duration::from_secs(5),
        ..SpecialistSettings::default_for(condition)
    };
    SpecialistBackend::from_settings(condition, &settings, reqwest::Client::new())
}

#[tokio::test]
async fn reply_comes_from_completion_field() {
    let server = spawn(provider_router(json!({
        "completion": "Breakfast:\n- Option 1: ragi dosa",
        "num_tokens": 12
    })))
    .await;
    let reply = backend(Condition::Diabetes, server.url("/generate"))
        .respond("HbA1c 8.1, what should I eat?")
        .await;
    assert_eq!(reply, "Breakfast:\n- Option 1: ragi dosa");
}

#[tokio::test]
async fn lipids_reads_plan_before_completion() {
    let server = spawn(provider_router(json!({
        "plan": "Lipid plan text",
        "completion": "ignored"
    })))
    .await;
    let reply = backend(Condition::Lipids, server.url("/generate"))
        .respond("LDL 190")
        .await;
    assert_eq!(reply, "Lipid plan text");
}

#[tokio::test]
async fn lipids_posts_planner_body_with_message_in_notes() {
    let (route, seen) = capturing(json!({"plan": "Lower saturated fat."}));
    let server = spawn(Router::new().route("/v1/lipids/plan", route)).await;

    let reply = backend(Condition::Lipids, server.url("/v1/lipids/plan"))
        .respond("  My LDL is 190, what should I eat?  ")
        .await;
    assert_eq!(reply, "Lower saturated fat.");

    let bodies = seen.lock().unwrap();
    assert_eq!(bodies.len(), 1);
    assert_eq!(
        bodies[0],
        json!({
            "age": 60,
            "sex": "M",
            "ldl": 150.0,
            "hdl": 40.0,
            "tg": 200.0,
            "comorbidities": [],
            "notes": "My LDL is 190, what should I eat?"
        })
    );
}

#[tokio::test]
async fn generic_specialists_post_prompt_and_budget() {
    let (route, seen) = capturing(json!({"completion": "ok"}));
    let server = spawn(Router::new().route("/generate", route)).await;

    backend(Condition::Kidney, server.url("/generate"))
        .respond("CKD stage 3")
        .await;

    let bodies = seen.lock().unwrap();
    let body = bodies[0].as_object().unwrap();
    let mut keys: Vec<_> = body.keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(keys, ["max_new_tokens", "prompt"]);
    assert_eq!(body["max_new_tokens"], 200);
    assert!(body["prompt"].as_str().unwrap().contains("Patient request:\nCKD stage 3"));
}

#[tokio::test]
async fn falls_back_through_text_and_output() {
    let server = spawn(provider_router(json!({"completion": " ", "output": "from output"}))).await;
    let reply = backend(Condition::Kidney, server.url("/generate"))
        .respond("CKD stage 3")
        .await;
    assert_eq!(reply, "from output");
}

#[tokio::test]
async fn provider_error_becomes_sentinel() {
    let server = spawn(Router::new().route("/generate", failing(StatusCode::INTERNAL_SERVER_ERROR))).await;
    let reply = backend(Condition::Hypertension, server.url("/generate"))
        .respond("BP 150/95")
        .await;
    assert!(
        reply.starts_with("[Hypertension specialist error: provider error: HTTP 500"),
        "{reply}"
    );
}

#[tokio::test]
async fn empty_reply_becomes_sentinel() {
    let server = spawn(provider_router(json!({"model": "x"}))).await;
    let reply = backend(Condition::Diabetes, server.url("/generate"))
        .respond("glucose")
        .await;
    assert_eq!(reply, "[Diabetes specialist error: provider returned no content]");
}

#[tokio::test]
async fn unreachable_provider_becomes_sentinel() {
    let reply = backend(Condition::Lipids, "http://127.0.0.1:9/generate".to_owned())
        .respond("triglycerides 300")
        .await;
    assert!(reply.starts_with("[Lipids specialist error:"), "{reply}");
}

#[tokio::test]
async fn registry_chat_routes_over_http() {
    let kidney = spawn(provider_router(json!({"completion": "kidney plan"}))).await;
    let general = spawn(provider_router(json!({"text": "general plan"}))).await;

    let mut settings = NutriSettings::default();
    settings.specialists.insert(
        Condition::Kidney,
        SpecialistSettings {
            url: kidney.url("/generate"),
            ..SpecialistSettings::default_for(Condition::Kidney)
        },
    );
    settings.specialists.insert(
        Condition::General,
        SpecialistSettings {
            url: general.url("/generate"),
            ..SpecialistSettings::default_for(Condition::General)
        },
    );
    let registry = SpecialistRegistry::from_settings(&settings);

    let reply = registry.chat("on dialysis, high cholesterol").await;
    assert_eq!(reply.reply, "kidney plan");
    assert_eq!(reply.provider, "kidney");
    assert!(reply.specialized);

    let reply = registry.chat("what is a good breakfast?").await;
    assert_eq!(reply.reply, "general plan");
    assert!(!reply.specialized);
}
