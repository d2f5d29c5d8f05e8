//! Background progress reporter: `analysis` jobs post partial results mid-search so a
//! long-running job isn't all-or-nothing from the server's point of view. Reports are
//! best-effort: a bounded queue and `try_send` mean a slow or unreachable server drops
//! reports rather than blocking the worker that produced them.

use std::time::Duration;

use tokio::sync::mpsc;

const HTTP_TIMEOUT: Duration = Duration::from_secs(15);
const TOO_MANY_REQUESTS_PAUSE: Duration = Duration::from_secs(60);

enum Item {
    Report { path: String, body: Vec<u8> },
    Stop,
}

/// Handle to a running progress-reporter task. Cloning shares the same background task
/// and its bounded queue across every worker.
#[derive(Clone)]
pub struct ProgressReporter {
    tx: mpsc::Sender<Item>,
}

impl ProgressReporter {
    /// Spawn the reporter task, POSTing to `base_url` with `user_agent` and `queue_size`
    /// slots of buffering.
    pub fn spawn(client: reqwest::Client, base_url: String, user_agent: String, queue_size: usize) -> Self {
        let (tx, rx) = mpsc::channel(queue_size.max(1));
        tokio::spawn(run(client, base_url, user_agent, rx));
        Self { tx }
    }

    /// Enqueue a progress report for `job_id`. Silently dropped if the queue is full or
    /// the reporter task has already shut down.
    pub fn report(&self, job_id: &str, body: Vec<u8>) {
        let item = Item::Report { path: format!("analysis/{job_id}"), body };
        let _ = self.tx.try_send(item);
    }

    /// Ask the reporter to drain its queue and shut down. Awaiting this ensures any
    /// in-flight report has been attempted before the process exits.
    pub async fn shutdown(self) {
        let _ = self.tx.send(Item::Stop).await;
    }
}

async fn run(client: reqwest::Client, base_url: String, user_agent: String, mut rx: mpsc::Receiver<Item>) {
    while let Some(item) = rx.recv().await {
        match item {
            Item::Stop => return,
            Item::Report { path, body } => {
                let url = format!("{base_url}{path}");
                let result = client
                    .post(&url)
                    .header("User-Agent", &user_agent)
                    .header("Content-Type", "application/json")
                    .timeout(HTTP_TIMEOUT)
                    .body(body)
                    .send()
                    .await;
                match result {
                    Ok(response) if response.status() == 429 => {
                        tokio::time::sleep(TOO_MANY_REQUESTS_PAUSE).await;
                    }
                    Ok(response) if response.status() != 204 => {
                        eprintln!(
                            "progress report to {path} returned {}, expected 204",
                            response.status()
                        );
                    }
                    Ok(_) => {}
                    Err(err) => eprintln!("could not send progress report for {path}: {err}"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A full queue must drop the newest report rather than block the caller; the
    /// unreachable base URL just means the reporter task's own POST attempts fail
    /// quietly, which is irrelevant to what's under test here.
    #[tokio::test]
    async fn report_never_blocks_when_the_queue_is_full() {
        let client = reqwest::Client::new();
        let reporter =
            ProgressReporter::spawn(client, "http://127.0.0.1:1/".to_string(), "fishnet/test".to_string(), 1);

        for i in 0..50 {
            reporter.report("job1", format!("{{\"n\":{i}}}").into_bytes());
        }

        reporter.shutdown().await;
    }
}
