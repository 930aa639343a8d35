/// One line of user input, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand<'a> {
    /// Plain shell input; run it and wait for the prompt.
    Run(&'a str),
    Download { local: &'a str, remote: &'a str },
    Upload { local: &'a str, remote: &'a str },
    Quit,
    /// An unrecognised `/xyz` line, forwarded without the slash.
    Passthrough(&'a str),
    /// A transfer command missing its arguments.
    Usage(&'static str),
    /// A line holding only whitespace after the slash.
    Empty,
}

impl<'a> SlashCommand<'a> {
    pub fn parse(line: &'a str) -> Self {
        let Some(body) = line.strip_prefix('/') else {
            return SlashCommand::Run(line);
        };
        if body.trim().is_empty() {
            return SlashCommand::Empty;
        }
        let mut parts = line.split_whitespace();
        let name = parts.next().unwrap_or(line);
        let mut paths = || match (parts.next(), parts.next()) {
            (Some(local), Some(remote)) => Some((local, remote)),
            _ => None,
        };
        match name {
            "/get" | "/download" => match paths() {
                Some((local, remote)) => SlashCommand::Download { local, remote },
                None => SlashCommand::Usage(usage(name)),
            },
            "/upload" => match paths() {
                Some((local, remote)) => SlashCommand::Upload { local, remote },
                None => SlashCommand::Usage(usage(name)),
            },
            "/quit" | "/exit" => SlashCommand::Quit,
            _ => SlashCommand::Passthrough(body),
        }
    }
}

fn usage(name: &str) -> &'static str {
    match name {
        "/get" => "usage: /get <localpath> <remotepath>",
        "/download" => "usage: /download <localpath> <remotepath>",
        _ => "usage: /upload <localpath> <remotepath>",
    }
}
