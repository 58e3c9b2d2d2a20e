//! Loopback HTTP responder and archive builders shared by the tests.

use std::{
    io::{Cursor, Read, Write},
    net::TcpListener,
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use zip::{write::FileOptions, ZipWriter};

pub(crate) struct CannedServer {
    pub(crate) url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl CannedServer {
    /// Serves one connection per entry in `responses`, in order, then stops.
    pub(crate) fn start(responses: Vec<Vec<u8>>) -> Self {
        Self::serve(responses, None)
    }

    /// Answers one connection with `partial` and then keeps it open for
    /// `hold` without sending anything else.
    pub(crate) fn stalled(partial: Vec<u8>, hold: Duration) -> Self {
        Self::serve(vec![partial], Some(hold))
    }

    fn serve(responses: Vec<Vec<u8>>, hold: Option<Duration>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);
        thread::spawn(move || {
            for response in responses {
                let Ok((mut stream, _)) = listener.accept() else {
                    return;
                };
                let head = read_request_head(&mut stream);
                seen.lock().unwrap().push(head);
                let _ = stream.write_all(&response);
                let _ = stream.flush();
                if let Some(hold) = hold {
                    thread::sleep(hold);
                }
            }
        });
        Self {
            url: format!("http://{addr}/download/trid.zip"),
            requests,
        }
    }

    /// Request lines received so far, e.g. `HEAD /download/trid.zip HTTP/1.1`.
    pub(crate) fn request_lines(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter_map(|head| head.lines().next().map(str::to_string))
            .collect()
    }
}

fn read_request_head(stream: &mut impl Read) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        match stream.read(&mut byte) {
            Ok(1) => head.push(byte[0]),
            _ => break,
        }
    }
    String::from_utf8_lossy(&head).into_owned()
}

pub(crate) fn response(status: &str, headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
    let mut out = format!("HTTP/1.1 {status}\r\nConnection: close\r\n");
    for (name, value) in headers {
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    out.push_str("\r\n");
    let mut out = out.into_bytes();
    out.extend_from_slice(body);
    out
}

pub(crate) fn ok_with_body(body: &[u8]) -> Vec<u8> {
    let len = body.len().to_string();
    response("200 OK", &[("Content-Length", &len)], body)
}

pub(crate) fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().unix_permissions(0o755);
    for (name, contents) in entries {
        if name.ends_with('/') {
            writer.add_directory(*name, options).unwrap();
        } else {
            writer.start_file(*name, options).unwrap();
            writer.write_all(contents).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}
