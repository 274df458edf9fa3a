//! End-to-end tests for PTY sessions
//!
//! These tests fork real children onto real PTYs and relay through pipes
//! standing in for the caller's stdio. Wrapped commands are chosen to exit
//! on their own: raw mode disables canonical end-of-file handling, so a
//! child that only stops at EOF would outlive the input stream.

use std::io::{Read, Seek};
use std::os::fd::{AsRawFd, OwnedFd};
use std::time::{Duration, Instant};

use nix::unistd::{pipe, read, write};

use ptywrap::{Command, Session};

/// Read from `fd` until EOF.
fn read_all(fd: &OwnedFd) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        match read(fd.as_raw_fd(), &mut buf) {
            Ok(0) => break,
            Ok(n) => out.extend_from_slice(&buf[..n]),
            Err(e) => panic!("read failed: {e}"),
        }
    }
    out
}

/// An input descriptor that is already at EOF.
fn closed_input() -> OwnedFd {
    let (input_read, input_write) = pipe().unwrap();
    drop(input_write);
    input_read
}

#[test]
fn exit_status_is_propagated() {
    let session = Session::spawn(&Command::new("sh", ["-c", "exit 7"])).unwrap();

    let input = closed_input();
    let (output_read, output_write) = pipe().unwrap();
    let status = session
        .run_with(input.as_raw_fd(), output_write.as_raw_fd())
        .unwrap();

    assert_eq!(status, 7);
    drop(output_write);
    assert_eq!(read_all(&output_read), b"");
}

#[test]
fn signal_killed_child_reports_failure_status() {
    let session = Session::spawn(&Command::new("sh", ["-c", "kill -KILL $$"])).unwrap();

    let input = closed_input();
    let (_output_read, output_write) = pipe().unwrap();
    let status = session
        .run_with(input.as_raw_fd(), output_write.as_raw_fd())
        .unwrap();

    assert_eq!(status, 1);
}

#[test]
fn silent_child_terminates_promptly() {
    let session = Session::spawn(&Command::new("true", Vec::<String>::new())).unwrap();

    let input = closed_input();
    let (_output_read, output_write) = pipe().unwrap();

    let started = Instant::now();
    let status = session
        .run_with(input.as_raw_fd(), output_write.as_raw_fd())
        .unwrap();

    assert_eq!(status, 0);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn output_arrives_verbatim_with_no_eot() {
    let session = Session::spawn(&Command::new("echo", ["file me"])).unwrap();

    let input = closed_input();
    let tmp = tempfile::tempfile().unwrap();
    let status = session
        .run_with(input.as_raw_fd(), tmp.as_raw_fd())
        .unwrap();
    assert_eq!(status, 0);

    let mut tmp = tmp;
    tmp.rewind().unwrap();
    let mut text = String::new();
    tmp.read_to_string(&mut text).unwrap();
    // Raw mode disables output post-processing, so the newline is untouched
    // and no EOT byte is appended on the output side.
    assert_eq!(text, "file me\n");
}

#[test]
fn input_lines_reach_the_child_terminal() {
    let session =
        Session::spawn(&Command::new("sh", ["-c", "head -n 1 | tr a-z A-Z"])).unwrap();

    let (input_read, input_write) = pipe().unwrap();
    let (output_read, output_write) = pipe().unwrap();

    // Let the child reach exec and install raw mode before any bytes land
    // in the slave input queue, where they would otherwise be echoed.
    std::thread::sleep(Duration::from_millis(300));
    write(&input_write, b"hello\n").unwrap();
    drop(input_write);

    let status = session
        .run_with(input_read.as_raw_fd(), output_write.as_raw_fd())
        .unwrap();
    assert_eq!(status, 0);

    drop(output_write);
    assert_eq!(read_all(&output_read), b"HELLO\n");
}

#[test]
fn eot_byte_follows_the_input_stream() {
    // head -c 7 copies "hello\n" plus the injected EOT byte and exits,
    // exposing exactly what arrived on the child's terminal input.
    let session = Session::spawn(&Command::new("head", ["-c", "7"])).unwrap();

    let (input_read, input_write) = pipe().unwrap();
    let (output_read, output_write) = pipe().unwrap();

    std::thread::sleep(Duration::from_millis(300));
    write(&input_write, b"hello\n").unwrap();
    drop(input_write);

    let status = session
        .run_with(input_read.as_raw_fd(), output_write.as_raw_fd())
        .unwrap();
    assert_eq!(status, 0);

    drop(output_write);
    assert_eq!(read_all(&output_read), b"hello\n\x04");
}
