mod support;

use beach_tunnel::session::{CommandStatus, LoopExit, PromptEchoFilter, Session, interactive};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use support::{FakeShell, Framer, Reply, config, whole};

async fn run(session: &mut Session<beach_tunnel::transport::MockTransport>, command: &str) -> String {
    let mut out = Vec::new();
    let status = session.run_command(command, &mut out).await.expect("command runs");
    assert_eq!(status, CommandStatus::Completed);
    String::from_utf8(out).expect("utf-8 output")
}

#[tokio::test]
async fn short_command_prints_output_and_prompt() {
    let shell = FakeShell::new("> ", true);
    let mut session = Session::new(shell.transport(whole()), config("> ", true));
    assert_eq!(run(&mut session, "echo hi").await, "hi\r\n> ");
    assert_eq!(shell.commands(), vec!["echo hi"]);
}

#[tokio::test]
async fn echo_is_kept_when_suppression_is_off() {
    let shell = FakeShell::new("> ", false);
    let mut session = Session::new(shell.transport(whole()), config("> ", false));
    assert_eq!(run(&mut session, "echo hi").await, "hi\r\n> ");

    let shell = FakeShell::new("> ", true);
    let mut session = Session::new(shell.transport(whole()), config("> ", false));
    assert_eq!(run(&mut session, "echo hi").await, "echo hi\r\nhi\r\n> ");
}

#[tokio::test]
async fn handshake_switches_the_prompt() {
    let shell = FakeShell::new("/app # ", true).with_output("whoami", "root\r\n");
    let mut session = Session::new(shell.transport(whole()), config("> ", true));
    let status = session.handshake("> ").await.expect("handshake");
    assert_eq!(status, CommandStatus::Completed);
    assert_eq!(shell.prompt(), "> ");
    assert_eq!(run(&mut session, "whoami").await, "root\r\n> ");
}

#[tokio::test]
async fn output_survives_random_fragmentation() {
    for seed in 0..64u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let framer: Framer = Box::new(move |reply: &Reply| {
            let text = reply.joined();
            let mut cuts: Vec<usize> = (0..rng.gen_range(1..8))
                .map(|_| rng.gen_range(1..text.len()))
                .collect();
            cuts.sort_unstable();
            cuts.dedup();
            let mut pieces = Vec::new();
            let mut start = 0;
            for cut in cuts {
                pieces.push(text[start..cut].to_string());
                start = cut;
            }
            pieces.push(text[start..].to_string());
            pieces
        });
        let shell =
            FakeShell::new("> ", true).with_output("cat notes.txt", "line one\r\nline two\r\n");
        let mut session = Session::new(shell.transport(framer), config("> ", true));
        assert_eq!(
            run(&mut session, "cat notes.txt").await,
            "line one\r\nline two\r\n> ",
            "seed {seed}"
        );
    }
}

#[tokio::test]
async fn silent_remote_times_out_instead_of_hanging() {
    let shell = FakeShell::new("> ", true);
    let framer: Framer = Box::new(|reply: &Reply| vec![reply.echo.clone()]);
    let mut session = Session::new(shell.transport(framer), config("> ", true));
    let mut out = Vec::new();
    let status = session.run_command("sleep 100", &mut out).await.expect("run");
    assert_eq!(status, CommandStatus::TimedOut);
    assert!(out.is_empty());
}

#[test]
fn retained_text_stays_within_the_buffer_bound() {
    let bound = 64;
    let mut filter = PromptEchoFilter::new("make", "> ", bound, true);
    for _ in 0..200 {
        filter.push("noise without the command in it ");
        assert!(filter.buffered_len() <= bound.max("make> ".len()));
    }

    let mut filter = PromptEchoFilter::new("make", "> ", bound, false);
    let mut emitted = 0;
    for _ in 0..200 {
        emitted += filter.push("\r\n\r\n").output.len();
        assert!(filter.buffered_len() <= bound);
    }
    assert!(emitted > 0);
    assert!(filter.push("> ").done);
}

#[tokio::test]
async fn interactive_loop_dispatches_commands_and_transfers() {
    let dir = tempfile::tempdir().expect("tempdir");
    let local = dir.path().join("report.txt");
    std::fs::write(&local, b"quarterly numbers\n").expect("write local");
    let fetched = dir.path().join("fetched/report.txt");

    let shell = FakeShell::new("> ", true);
    let transport = shell.transport(whole());
    let closed = transport.closed_flag();
    let mut session = Session::new(transport, config("> ", true));

    let script = format!(
        "/upload {local} /srv/report.txt\n/get {fetched} /srv/report.txt\necho done\n/nope\n/quit\necho never\n",
        local = local.display(),
        fetched = fetched.display(),
    );
    let mut out = Vec::new();
    let exit = interactive(&mut session, script.as_bytes(), &mut out)
        .await
        .expect("loop");
    assert_eq!(exit, LoopExit::Quit);
    assert!(closed.load(std::sync::atomic::Ordering::SeqCst));

    let printed = String::from_utf8(out).expect("utf-8");
    assert!(printed.contains("upload finished"), "{printed}");
    assert!(printed.contains("download finished"), "{printed}");
    assert!(printed.contains("done\r\n> "), "{printed}");
    assert_eq!(
        shell.file("/srv/report.txt").as_deref(),
        Some(&b"quarterly numbers\n"[..])
    );
    assert_eq!(std::fs::read(&fetched).expect("fetched"), b"quarterly numbers\n");
    assert!(shell.commands().contains(&"nope".to_string()));
    assert!(!shell.commands().contains(&"echo never".to_string()));
}
