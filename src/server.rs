//  Copyright 2026 the phonedb authors
//
//  Licensed under the Apache License, Version 2.0 (the "License");
//  you may not use this file except in compliance with the License.
//  You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.

//! The HTTP boundary: one endpoint per database operation.
//!
//! Handlers are a stateless translation between request parameters and core
//! calls. Each one reserves slots against the process-wide worker budget,
//! runs the blocking core operation off the async runtime, and reports the
//! result through `ANSWER` + `TIME` response headers, or an `ERROR` header
//! carrying the failure kind and message. `/print` streams its body while
//! the scan guard is held.

use std::{
    convert::Infallible,
    io::{self, BufWriter, Write},
    sync::Arc,
    time::Instant,
};

use axum::{
    body::{Body, Bytes},
    extract::{Form, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tokio::{
    net::TcpListener,
    sync::{mpsc, Notify},
    task,
};
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use tracing::{info, warn};

use crate::{
    budget::WorkerBudget,
    corpus::CorpusFiles,
    db::Database,
    error::{Error, Result},
    record::Record,
};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    db: Arc<Database>,
    budget: Arc<WorkerBudget>,
    corpus: Arc<CorpusFiles>,
    shutdown: Arc<Notify>,
}

impl AppState {
    pub fn new(db: Database, budget: WorkerBudget, corpus: CorpusFiles) -> Self {
        Self {
            db: Arc::new(db),
            budget: Arc::new(budget),
            corpus: Arc::new(corpus),
            shutdown: Arc::new(Notify::new()),
        }
    }
}

/// Build the endpoint router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/hi", get(hi))
        .route("/generate", post(generate))
        .route("/save", post(save))
        .route("/load", post(load))
        .route("/clear", post(clear))
        .route("/add", post(add))
        .route("/delete", post(delete))
        .route("/find", post(find))
        .route("/print", get(print))
        .route("/stop", get(stop))
        .with_state(state)
}

/// Serve until `/stop` is hit or the process is interrupted.
pub async fn serve(listener: TcpListener, state: AppState) -> io::Result<()> {
    let shutdown = Arc::clone(&state.shutdown);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = shutdown.notified() => info!("stop requested, shutting down"),
                _ = tokio::signal::ctrl_c() => info!("interrupted, shutting down"),
            }
        })
        .await
}

mod form_default {
    pub fn records() -> u64 {
        10
    }
    pub fn threads() -> usize {
        1
    }
    pub fn file_name() -> String {
        "data.csv".to_owned()
    }
}

#[derive(Debug, Deserialize)]
struct GenerateForm {
    #[serde(rename = "NumOfRecords", default = "form_default::records")]
    records: u64,
    #[serde(rename = "NumOfThreads", default = "form_default::threads")]
    threads: usize,
}

#[derive(Debug, Deserialize)]
struct FileForm {
    #[serde(rename = "FileName", default = "form_default::file_name")]
    file_name: String,
    #[serde(rename = "NumOfThreads", default = "form_default::threads")]
    threads: usize,
}

#[derive(Debug, Deserialize)]
struct ClearForm {
    #[serde(rename = "NumOfThreads", default = "form_default::threads")]
    threads: usize,
}

#[derive(Debug, Deserialize)]
struct AddForm {
    #[serde(rename = "NUMBER", default)]
    number: String,
    #[serde(rename = "LAST_NAME", default)]
    last_name: String,
    #[serde(rename = "FIRST_NAME", default)]
    first_name: String,
    #[serde(rename = "PATRONYMIC", default)]
    patronymic: String,
    #[serde(rename = "ACTIVITY", default)]
    activity: u8,
}

#[derive(Debug, Deserialize)]
struct NumberForm {
    #[serde(rename = "NUMBER", default)]
    number: String,
}

async fn hi() -> &'static str {
    info!("hi received");
    "Hello!"
}

async fn generate(State(state): State<AppState>, Form(form): Form<GenerateForm>) -> Response {
    info!(records = form.records, workers = form.threads, "generate received");
    let started = Instant::now();
    let outcome = run_blocking(move || {
        let _slot = state.budget.reserve(budget_slots(form.threads))?;
        let (records, bytes) = state.db.generate(
            form.records,
            form.threads,
            &state.corpus,
            state.db.default_wait(),
        )?;
        Ok(format!("Database generated: {records} records, {bytes} bytes."))
    })
    .await;
    respond(started, outcome)
}

async fn save(State(state): State<AppState>, Form(form): Form<FileForm>) -> Response {
    info!(file = %form.file_name, workers = form.threads, "save received");
    let started = Instant::now();
    let outcome = run_blocking(move || {
        let _slot = state.budget.reserve(budget_slots(form.threads))?;
        let lines = state
            .db
            .save(form.threads, &form.file_name, state.db.default_wait())?;
        Ok(format!("Database saved: {lines} lines written."))
    })
    .await;
    respond(started, outcome)
}

async fn load(State(state): State<AppState>, Form(form): Form<FileForm>) -> Response {
    info!(file = %form.file_name, workers = form.threads, "load received");
    let started = Instant::now();
    let outcome = run_blocking(move || {
        let _slot = state.budget.reserve(budget_slots(form.threads))?;
        let rows = state
            .db
            .load(form.threads, &form.file_name, state.db.default_wait())?;
        Ok(format!("Database loaded: {rows} rows read."))
    })
    .await;
    respond(started, outcome)
}

async fn clear(State(state): State<AppState>, Form(form): Form<ClearForm>) -> Response {
    info!(workers = form.threads, "clear received");
    let started = Instant::now();
    let outcome = run_blocking(move || {
        let _slot = state.budget.reserve(budget_slots(form.threads))?;
        state.db.clear(form.threads, state.db.default_wait())?;
        Ok("Database cleared.".to_owned())
    })
    .await;
    respond(started, outcome)
}

async fn add(State(state): State<AppState>, Form(form): Form<AddForm>) -> Response {
    info!(number = %form.number, "add received");
    let started = Instant::now();
    let outcome = run_blocking(move || {
        let _slot = state.budget.reserve(1)?;
        let record = Record::new(form.last_name, form.first_name, form.patronymic);
        let summary = format!(
            "{}, {} {} {}",
            form.number, record.last_name, record.first_name, record.patronymic
        );
        let created = state.db.insert(
            &form.number,
            form.activity != 0,
            record,
            state.db.default_wait(),
        )?;
        Ok(if created {
            format!("New record added: {summary}.")
        } else {
            format!("Record replaced: {summary}.")
        })
    })
    .await;
    respond(started, outcome)
}

async fn delete(State(state): State<AppState>, Form(form): Form<NumberForm>) -> Response {
    info!(number = %form.number, "delete received");
    let started = Instant::now();
    let outcome = run_blocking(move || {
        let _slot = state.budget.reserve(1)?;
        let removed = state.db.remove(&form.number, state.db.default_wait())?;
        Ok(if removed {
            format!("Record with number {} deleted.", form.number)
        } else {
            "The record was not in the database.".to_owned()
        })
    })
    .await;
    respond(started, outcome)
}

async fn find(State(state): State<AppState>, Form(form): Form<NumberForm>) -> Response {
    info!(number = %form.number, "find received");
    let started = Instant::now();
    let outcome = run_blocking(move || {
        let _slot = state.budget.reserve(1)?;
        let found = state.db.find(&form.number, state.db.default_wait())?;
        Ok(match found {
            Some((active, record)) => format!(
                "Subscriber {} {} {} has number {} and is {}.",
                record.last_name,
                record.first_name,
                record.patronymic,
                form.number,
                if active { "active" } else { "inactive" },
            ),
            None => format!("Subscriber with number {} is not in the phone base.", form.number),
        })
    })
    .await;
    respond(started, outcome)
}

async fn print(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let active = header_str(&headers, "ACTIVITY") == Some("1");
    let workers = header_parse(&headers, "NumOfThreads").unwrap_or(1);
    let worker_index = header_parse(&headers, "WorkerIndex").unwrap_or(0);
    info!(active, workers, worker_index, "print received");

    let slot = match state.budget.reserve(1) {
        Ok(slot) => slot,
        Err(e) => return respond(Instant::now(), Err(e)),
    };

    let (tx, rx) = mpsc::channel::<Bytes>(64);
    task::spawn_blocking(move || {
        let _slot = slot;
        let started = Instant::now();
        let guard = state.db.scan();
        let mut sink = BufWriter::new(ChannelWriter { tx });
        match guard
            .stream(active, workers, worker_index, &mut sink)
            .and_then(|lines| sink.flush().map(|_| lines).map_err(stream_error))
        {
            Ok(lines) => {
                info!(lines, elapsed_ms = started.elapsed().as_millis(), "print streamed")
            }
            Err(error) => warn!(%error, "print stream failed"),
        }
    });

    Body::from_stream(ReceiverStream::new(rx).map(Ok::<_, Infallible>)).into_response()
}

async fn stop(State(state): State<AppState>) -> Response {
    info!("stop received");
    state.shutdown.notify_one();
    respond(Instant::now(), Ok("The server is stopping.".to_owned()))
}

/// Slots a request must hold: its worker count, one at minimum.
fn budget_slots(threads: usize) -> u32 {
    u32::try_from(threads.max(1)).unwrap_or(u32::MAX)
}

async fn run_blocking<T: Send + 'static>(
    op: impl FnOnce() -> Result<T> + Send + 'static,
) -> Result<T> {
    match task::spawn_blocking(op).await {
        Ok(result) => result,
        Err(_) => Err(Error::Unknown),
    }
}

fn respond(started: Instant, outcome: Result<String>) -> Response {
    let elapsed = started.elapsed().as_millis().to_string();
    match outcome {
        Ok(answer) => {
            info!(%answer, elapsed_ms = %elapsed);
            with_headers(vec![("answer", answer), ("time", elapsed)])
        }
        Err(error) => {
            warn!(kind = error.kind(), %error);
            with_headers(vec![("error", format!("{}: {}", error.kind(), error))])
        }
    }
}

fn with_headers(pairs: Vec<(&'static str, String)>) -> Response {
    let mut response = ().into_response();
    for (name, value) in pairs {
        let value = HeaderValue::from_str(&value)
            .unwrap_or_else(|_| HeaderValue::from_static("unrepresentable"));
        response.headers_mut().insert(HeaderName::from_static(name), value);
    }
    response
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name)?.to_str().ok().map(str::trim)
}

fn header_parse(headers: &HeaderMap, name: &str) -> Option<usize> {
    header_str(headers, name)?.parse().ok()
}

fn stream_error(e: io::Error) -> Error {
    Error::FileWrite {
        file: "<stream>".to_owned(),
        source: e,
    }
}

/// Adapts the blocking scan writer to the async response body.
struct ChannelWriter {
    tx: mpsc::Sender<Bytes>,
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx
            .blocking_send(Bytes::copy_from_slice(buf))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "client went away"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
