/// The byte offset of a 1-based line/column pair.
/// Positions past the end of a line clamp to the line end.
pub fn get_offset(source: &str, line: usize, column: usize) -> usize {
    let mut offset = 0;
    for (index, text) in source.split_inclusive('\n').enumerate() {
        if index + 1 == line {
            let content = text.trim_end_matches(['\n', '\r']);
            let within = content
                .char_indices()
                .nth(column.saturating_sub(1))
                .map_or(content.len(), |(i, _)| i);
            return offset + within;
        }
        offset += text.len();
    }
    source.len()
}

/// Default JSON name of a field: underscores removed, the following letter upper-cased.
pub fn json_name(field_name: &str) -> String {
    let mut out = String::with_capacity(field_name.len());
    let mut upper_next = false;
    for c in field_name.chars() {
        if c == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Name of the synthetic nested message backing a `map<K,V>` field.
pub fn map_entry_name(field_name: &str) -> String {
    let camel = json_name(field_name);
    let mut chars = camel.chars();
    match chars.next() {
        Some(first) => format!("{}{}Entry", first.to_uppercase(), chars.as_str()),
        None => "Entry".to_string(),
    }
}

/// Case-insensitive key used to make `FileSet::add` idempotent per file name.
pub fn normalize_file_name(name: &str) -> String {
    name.replace('\\', "/").trim_start_matches("./").to_lowercase()
}
