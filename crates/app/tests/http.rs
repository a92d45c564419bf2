use std::time::Duration;

use app::server::{AppState, router};
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use runlet::RuntimeConfig;
use runlet::runtime::PythonRuntime;
use tower::ServiceExt;

fn python_router(timeout: Duration) -> Router {
    let runtime = PythonRuntime::new(RuntimeConfig {
        python_path: "python3".to_owned(),
        base_tempdir_path: std::env::temp_dir(),
        default_entrypoint: "main.py".to_owned(),
        timeout,
    });
    router(AppState { runtime }, Duration::from_secs(120), 16)
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, String) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

fn post(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/runtime/python")
        .body(Body::from(body.to_owned()))
        .unwrap()
}

#[tokio::test]
async fn run_with_code_without_headers() {
    let (status, body) = send(
        python_router(Duration::from_secs(30)),
        post("print(\"hello, world!\")\n"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "hello, world!\n");
}

#[tokio::test]
async fn run_with_code_with_form_content_type() {
    let request = Request::builder()
        .method("POST")
        .uri("/runtime/python")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("print(\"hello, world!\")\n"))
        .unwrap();
    let (status, body) = send(python_router(Duration::from_secs(30)), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "hello, world!\n");
}

#[tokio::test]
async fn run_with_multiple_files_as_multipart() {
    let body = concat!(
        "--BOUNDARY\r\n",
        "Content-Disposition: form-data; name=\"code.py\"; filename=\"code.py\"\r\n",
        "\r\n",
        "def code():\n    print(\"hi from code.py\")\n\r\n",
        "--BOUNDARY\r\n",
        "Content-Disposition: form-data; name=\"main.py\"; filename=\"main.py\"\r\n",
        "\r\n",
        "from code import code\n\ncode()\n\r\n",
        "--BOUNDARY--\r\n",
    );
    let request = Request::builder()
        .method("POST")
        .uri("/runtime/python")
        .header(
            header::CONTENT_TYPE,
            "multipart/form-data; boundary=BOUNDARY",
        )
        .body(Body::from(body))
        .unwrap();
    let (status, body) = send(python_router(Duration::from_secs(30)), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "hi from code.py\n");
}

#[tokio::test]
async fn run_with_multiple_files_as_json() {
    let payload = serde_json::json!({
        "files": {
            "code.py": "def code():\n    print(\"hi from code.py\")\n",
            "main.py": "from code import code\n\ncode()\n",
        }
    });
    let request = Request::builder()
        .method("POST")
        .uri("/runtime/python")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap();
    let (status, body) = send(python_router(Duration::from_secs(30)), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "hi from code.py\n");
}

#[tokio::test]
async fn run_with_code_that_errors_still_succeeds_at_transport_level() {
    let (status, body) = send(
        python_router(Duration::from_secs(30)),
        post("raise Exception(\"test exception\")\n"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Exception: test exception"));
}

#[tokio::test]
async fn args_header_is_forwarded_to_the_program() {
    let request = Request::builder()
        .method("POST")
        .uri("/runtime/python")
        .header("x-runlet-args", "Hi World!")
        .body(Body::from("import sys\nprint(sys.argv[1:])\n"))
        .unwrap();
    let (status, body) = send(python_router(Duration::from_secs(30)), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "['Hi', 'World!']\n");
}

#[tokio::test]
async fn entrypoint_header_selects_the_file_to_execute() {
    let payload = serde_json::json!({
        "files": {
            "run.py": "print(\"custom entrypoint\")\n",
        }
    });
    let request = Request::builder()
        .method("POST")
        .uri("/runtime/python")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-runlet-entrypoint", "run.py")
        .body(Body::from(payload.to_string()))
        .unwrap();
    let (status, body) = send(python_router(Duration::from_secs(30)), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "custom entrypoint\n");
}

#[tokio::test]
async fn unsupported_content_type_is_rejected_before_execution() {
    let request = Request::builder()
        .method("POST")
        .uri("/runtime/python")
        .header(header::CONTENT_TYPE, "unsupported/type")
        .body(Body::from("print('hi')"))
        .unwrap();
    let (status, body) = send(python_router(Duration::from_secs(30)), request).await;

    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(parsed["error"], "Unsupported content type");
    assert!(parsed["message"].is_string());
}

#[tokio::test]
async fn traversal_in_file_set_is_rejected() {
    let payload = serde_json::json!({
        "files": {
            "../foo.py": "print('escape')\n",
            "main.py": "print('hi')\n",
        }
    });
    let request = Request::builder()
        .method("POST")
        .uri("/runtime/python")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap();
    let (status, body) = send(python_router(Duration::from_secs(30)), request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(parsed["error"], "Invalid filepath");
}

#[tokio::test]
async fn missing_entrypoint_in_file_set_is_rejected() {
    let payload = serde_json::json!({
        "files": {
            "code.py": "print('hi')\n",
        }
    });
    let request = Request::builder()
        .method("POST")
        .uri("/runtime/python")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap();
    let (status, body) = send(python_router(Duration::from_secs(30)), request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(parsed["error"], "Entrypoint not found");
}

#[tokio::test]
async fn empty_body_is_rejected_as_code_not_found() {
    let (status, body) = send(python_router(Duration::from_secs(30)), post("")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(parsed["error"], "Code not found");
}

#[tokio::test]
async fn timed_out_program_reports_a_failed_run_not_a_transport_error() {
    let (status, body) = send(
        python_router(Duration::from_secs(1)),
        post("import time\ntime.sleep(30)\nprint(\"late\")\n"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("timed out"));
}

#[tokio::test]
async fn healthcheck_responds_without_caching() {
    let request = Request::builder()
        .method("GET")
        .uri("/healthz")
        .body(Body::empty())
        .unwrap();
    let response = python_router(Duration::from_secs(30))
        .oneshot(request)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-store"
    );
}
