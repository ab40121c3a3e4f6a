/// Shell-like argument splitting for command text.
///
/// Handles:
/// - Arguments separated by ASCII or ideographic (U+3000) whitespace
/// - Quoted strings (single and double quotes, plus `“…”` curly quotes)
/// - Escape sequences within double quotes
pub fn shell_split(input: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_single_quote = false;
    let mut in_double_quote = false;
    let mut in_curly_quote = false;
    let mut escape_next = false;

    for ch in input.chars() {
        if escape_next {
            current.push(ch);
            escape_next = false;
            continue;
        }

        let quoted = in_single_quote || in_double_quote || in_curly_quote;
        match ch {
            '\\' if in_double_quote => escape_next = true,
            '\'' if !in_double_quote && !in_curly_quote => in_single_quote = !in_single_quote,
            '"' if !in_single_quote && !in_curly_quote => in_double_quote = !in_double_quote,
            '“' if !quoted => in_curly_quote = true,
            '”' if in_curly_quote => in_curly_quote = false,
            ' ' | '\t' | '\n' | '\u{3000}' if !quoted => {
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(ch),
        }
    }

    if !current.is_empty() {
        args.push(current);
    }

    args
}
