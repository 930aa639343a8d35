//! Shell command lines the client types into the remote shell on the user's
//! behalf.

/// Quote `text` as a single POSIX shell word.
pub fn shell_quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('\'');
    for c in text.chars() {
        if c == '\'' {
            quoted.push_str(r"'\''");
        } else {
            quoted.push(c);
        }
    }
    quoted.push('\'');
    quoted
}

/// Sets a predictable prompt and turns off colour so output can be matched.
pub fn prompt_setup(prompt: &str) -> String {
    format!(
        "export PS1={};unset LS_COLORS; export TERM=xterm-mono",
        shell_quote(prompt)
    )
}

/// Prints a remote file as one unterminated base64 line.
pub fn emit_base64(remote: &str) -> String {
    format!("cat {} | base64 -w 0", shell_quote(remote))
}

/// Terminator of the upload here-document. Contains `_`, which base64 never
/// produces, so no data line can end the document early.
pub const HEREDOC_END: &str = "BEACH_TUNNEL_EOF";

const SAVED_PS2: &str = "BEACH_TUNNEL_PS2";

/// Stops the terminal from echoing input and blanks the continuation prompt
/// until [`decode_heredoc`] finishes.
pub fn quiet_input() -> String {
    format!("stty -echo; {SAVED_PS2}=$PS2; PS2=")
}

/// Decodes the following here-document into `remote`, then restores what
/// [`quiet_input`] changed. Redirections carry no space so the command never
/// contains a `"> "` prompt.
pub fn decode_heredoc(remote: &str) -> String {
    format!(
        "base64 -d >{} <<'{HEREDOC_END}'; stty echo; PS2=${SAVED_PS2}; unset {SAVED_PS2}",
        shell_quote(remote)
    )
}

/// Ends the base64 line and then the here-document.
pub fn heredoc_end(newline: &str) -> String {
    format!("{newline}{HEREDOC_END}{newline}")
}
