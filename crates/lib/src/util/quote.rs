//! Command-line quoting.

/// Quote an argument for a POSIX shell.
///
/// Arguments made only of characters the shell never interprets are returned
/// unchanged so generated scripts stay readable.
pub fn shell_quote(arg: &str) -> String {
  if !arg.is_empty()
    && arg
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | '=' | ':' | ',' | '+' | '@' | '%'))
  {
    return arg.to_string();
  }
  format!("'{}'", arg.replace('\'', r"'\''"))
}

/// Join a program and its arguments into one shell command line.
pub fn shell_join<'a>(program: &str, args: impl IntoIterator<Item = &'a String>) -> String {
  let mut line = shell_quote(program);
  for arg in args {
    line.push(' ');
    line.push_str(&shell_quote(arg));
  }
  line
}

/// Quote an argument for a compiler response file (`@file`).
///
/// GCC, Clang and MSVC all accept double-quoted arguments with backslash
/// escapes for `"` and `\`.
pub fn response_file_quote(arg: &str) -> String {
  let mut quoted = String::with_capacity(arg.len() + 2);
  quoted.push('"');
  for c in arg.chars() {
    if matches!(c, '"' | '\\') {
      quoted.push('\\');
    }
    quoted.push(c);
  }
  quoted.push('"');
  quoted
}
