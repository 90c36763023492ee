//! TCP publish client
//!
//! Sends each payload as one newline-delimited JSON frame
//! `{"topic": ..., "payload": ...}` to the `bootstrap.servers` endpoint.
//! `produce` only buffers; frames are written from `poll`, and a write
//! counts as delivered once it reached the socket. On a write error the
//! client reconnects and retries, up to the configured `retries`.

use super::client::{DeliveryCallback, DeliveryReport, PublishClient};
use crate::core::{LoggerError, ProducerConfig, Result};
use parking_lot::{Condvar, Mutex};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::io::Write;
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

const IO_TIMEOUT: Duration = Duration::from_secs(5);

struct Frame {
    topic: String,
    line: Vec<u8>,
    on_delivery: DeliveryCallback,
}

/// Newline-delimited JSON producer over TCP
///
/// # Example
///
/// ```no_run
/// use rust_bus_logger::bridge::{DeliveryBridge, TcpClient};
/// use rust_bus_logger::ClientSettings;
///
/// let mut bridge = DeliveryBridge::new(TcpClient::connector());
/// let mut settings = ClientSettings::new();
/// settings.insert("bootstrap.servers".into(), "127.0.0.1:9400".into());
/// bridge.initialize(&settings).expect("collector is listening");
/// ```
pub struct TcpClient {
    address: String,
    retries: u32,
    stream: Mutex<Option<TcpStream>>,
    queue: Mutex<VecDeque<Frame>>,
    ready: Condvar,
}

impl TcpClient {
    /// Connect eagerly to the configured endpoint
    pub fn connect(config: &ProducerConfig) -> Result<Self> {
        let address = config.endpoint().ok_or_else(|| {
            LoggerError::config("TcpClient", "bootstrap.servers is required")
        })?;
        let retries = config.retries()?;
        let stream = Self::open(&address)?;

        Ok(Self {
            address,
            retries,
            stream: Mutex::new(Some(stream)),
            queue: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
        })
    }

    pub fn connector() -> super::Connector {
        Box::new(|config: &ProducerConfig| {
            let client: Arc<dyn PublishClient> = Arc::new(TcpClient::connect(config)?);
            Ok(client)
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn open(address: &str) -> Result<TcpStream> {
        let stream = TcpStream::connect(address).map_err(|e| {
            LoggerError::io_operation("connecting to collector", address.to_string(), e)
        })?;
        stream.set_write_timeout(Some(IO_TIMEOUT))?;
        stream.set_read_timeout(Some(IO_TIMEOUT))?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    fn write_frame(&self, line: &[u8]) -> std::result::Result<(), String> {
        let mut stream = self.stream.lock();
        let mut last_error = String::new();

        for attempt in 0..=self.retries {
            if stream.is_none() || attempt > 0 {
                match Self::open(&self.address) {
                    Ok(fresh) => *stream = Some(fresh),
                    Err(e) => {
                        last_error = e.to_string();
                        *stream = None;
                        continue;
                    }
                }
            }
            if let Some(conn) = stream.as_mut() {
                match conn.write_all(line).and_then(|()| conn.flush()) {
                    Ok(()) => return Ok(()),
                    Err(e) => {
                        last_error = e.to_string();
                        *stream = None;
                    }
                }
            }
        }
        Err(last_error)
    }
}

impl PublishClient for TcpClient {
    fn produce(&self, topic: &str, payload: Vec<u8>, on_delivery: DeliveryCallback) -> Result<()> {
        let payload = match serde_json::from_slice::<Value>(&payload) {
            Ok(value) => value,
            Err(_) => Value::String(String::from_utf8_lossy(&payload).into_owned()),
        };
        let mut line = serde_json::to_vec(&json!({ "topic": topic, "payload": payload }))?;
        line.push(b'\n');

        self.queue.lock().push_back(Frame {
            topic: topic.to_string(),
            line,
            on_delivery,
        });
        self.ready.notify_one();
        Ok(())
    }

    fn poll(&self, timeout: Duration) -> usize {
        let batch: Vec<Frame> = {
            let mut queue = self.queue.lock();
            if queue.is_empty() && !timeout.is_zero() {
                self.ready.wait_for(&mut queue, timeout);
            }
            queue.drain(..).collect()
        };

        let served = batch.len();
        for frame in batch {
            let report = match self.write_frame(&frame.line) {
                Ok(()) => DeliveryReport::delivered(frame.topic),
                Err(cause) => DeliveryReport::failed(frame.topic, cause),
            };
            (frame.on_delivery)(report);
        }
        served
    }

    fn in_flight(&self) -> usize {
        self.queue.lock().len()
    }

    fn name(&self) -> &str {
        "tcp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;
    use std::sync::mpsc;

    #[test]
    fn test_connect_requires_endpoint() {
        let err = TcpClient::connect(&ProducerConfig::new()).err().unwrap();
        assert!(matches!(err, LoggerError::Configuration { .. }));
    }

    #[test]
    fn test_connect_fails_without_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let config = ProducerConfig::new().with("bootstrap.servers", address);
        assert!(TcpClient::connect(&config).is_err());
    }

    #[test]
    fn test_frames_reach_collector() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let collector = std::thread::spawn(move || {
            let (socket, _) = listener.accept().unwrap();
            let mut line = String::new();
            BufReader::new(socket).read_line(&mut line).unwrap();
            line
        });

        let client =
            TcpClient::connect(&ProducerConfig::new().with("bootstrap.servers", address)).unwrap();
        let (tx, rx) = mpsc::channel();
        client
            .produce(
                "t",
                br#"{"level":"INFO","message":"ok"}"#.to_vec(),
                Box::new(move |report| {
                    let _ = tx.send(report);
                }),
            )
            .unwrap();
        assert_eq!(client.poll(Duration::from_millis(10)), 1);
        assert_eq!(rx.recv().unwrap(), DeliveryReport::delivered("t"));

        let frame: Value = serde_json::from_str(&collector.join().unwrap()).unwrap();
        assert_eq!(
            frame,
            json!({"topic": "t", "payload": {"level": "INFO", "message": "ok"}})
        );
    }
}
