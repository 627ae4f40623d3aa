//! 集成测试用的最小 HTTP/1.1 服务
//!
//! 对每个 GET 返回同一个响应体，可带 Content-Length，也可以关闭连接作为结束，
//! 或直接返回固定的错误状态码。

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

#[derive(Debug, Clone, Copy)]
pub struct BodyServerOptions {
    /// 为 false 时不发送 Content-Length，发送完响应体后关闭连接
    pub content_length: bool,
    /// 状态码，非 200 时不带响应体
    pub status: u16,
}

impl Default for BodyServerOptions {
    fn default() -> Self {
        Self {
            content_length: true,
            status: 200,
        }
    }
}

/// 在后台线程启动服务，返回形如 `http://127.0.0.1:12345/file` 的 URL。
/// 服务一直运行到进程退出。
pub fn start(body: Vec<u8>) -> String {
    start_with_options(body, BodyServerOptions::default())
}

pub fn start_with_options(body: Vec<u8>, opts: BodyServerOptions) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let body = Arc::clone(&body);
            thread::spawn(move || handle(stream, &body, opts));
        }
    });
    format!("http://127.0.0.1:{}/file", port)
}

fn handle(mut stream: TcpStream, body: &[u8], opts: BodyServerOptions) {
    let _ = stream.set_read_timeout(Some(std::time::Duration::from_secs(2)));
    if !read_request_head(&mut stream) {
        return;
    }

    if opts.status != 200 {
        let response = format!(
            "HTTP/1.1 {} Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            opts.status
        );
        let _ = stream.write_all(response.as_bytes());
        return;
    }

    let head = if opts.content_length {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        )
    } else {
        "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n\r\n"
            .to_string()
    };
    if stream.write_all(head.as_bytes()).is_err() {
        return;
    }
    // 客户端随时可能停止读取，写入失败直接结束
    for chunk in body.chunks(16 * 1024) {
        if stream.write_all(chunk).is_err() {
            return;
        }
    }
    let _ = stream.flush();
}

fn read_request_head(stream: &mut TcpStream) -> bool {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1024];
    loop {
        match stream.read(&mut byte) {
            Ok(0) | Err(_) => return false,
            Ok(n) => buf.extend_from_slice(&byte[..n]),
        }
        if buf.windows(4).any(|w| w == b"\r\n\r\n") {
            return true;
        }
    }
}
