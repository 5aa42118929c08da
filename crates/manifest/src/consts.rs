use regex::Regex;
use std::sync::LazyLock;

/// Prefixes a relative reference must start with to count as a resource.
const RELATIVE: &str = r"/runtime/|\.\./|build/";

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        pub(crate) static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

// attr="https://...", href = "https://..." and "key":"https://..."
regex!(ABSOLUTE_DOUBLE_QUOTED_REGEX, r#"(?:=\s*|":\s*)"(https?://[^"\s]+)""#);
// attr='https://...'
regex!(ABSOLUTE_SINGLE_QUOTED_REGEX, r"=\s*'(https?://[^'\s]+)'");

regex!(RELATIVE_DOUBLE_QUOTED_REGEX, format!(r#"=\s*"((?:{RELATIVE})[^"]+)""#).as_str());
regex!(RELATIVE_SINGLE_QUOTED_REGEX, format!(r"=\s*'((?:{RELATIVE})[^']+)'").as_str());
regex!(RELATIVE_JSON_REGEX, format!(r#""[^"]*":\s*"((?:{RELATIVE})[^"]+)""#).as_str());

/// Hosts whose URLs show up in markup as identifiers, not as resources.
pub(crate) const NON_RESOURCE_HOSTS: [&str; 3] = ["w3.org", "schema.org", "ogp.me"];
