//! Per-language declaration and symbol patterns.
//!
//! Declaration patterns only need to recognise the first line of a top-level
//! item (doc comments and attributes included, so they stay attached to the
//! item they describe). Nesting is checked separately by the code splitter.

use regex::Regex;
use std::sync::LazyLock;

use super::{Language, Symbol, SymbolKind};

pub struct LanguagePatterns {
    /// First line of a top-level declaration (or of its doc/attribute preamble).
    pub declaration: Regex,
    /// Preamble lines (attributes, decorators, doc comments) that must not be
    /// separated from the declaration that follows them.
    pub preamble: Option<Regex>,
    symbols: Vec<SymbolPattern>,
}

struct SymbolPattern {
    regex: Regex,
    /// Fixed kind; when `None` the kind comes from the `kw` capture group.
    kind: Option<SymbolKind>,
}

impl LanguagePatterns {
    /// Extract the symbol declared on `line`, if any.
    pub fn symbol(&self, line: &str) -> Option<Symbol> {
        self.symbols.iter().find_map(|pattern| {
            let caps = pattern.regex.captures(line)?;
            let name = caps.name("name")?.as_str().to_string();
            let kind = match pattern.kind {
                Some(kind) => kind,
                None => keyword_kind(caps.name("kw")?.as_str())?,
            };
            Some(Symbol { name, kind })
        })
    }

    pub fn is_preamble(&self, line: &str) -> bool {
        self.preamble.as_ref().is_some_and(|re| re.is_match(line))
    }
}

fn keyword_kind(keyword: &str) -> Option<SymbolKind> {
    Some(match keyword {
        "function" | "func" | "fn" | "def" | "fun" => SymbolKind::Function,
        "class" | "record" | "object" => SymbolKind::Class,
        "struct" | "union" => SymbolKind::Struct,
        "interface" | "protocol" => SymbolKind::Interface,
        "trait" => SymbolKind::Trait,
        "enum" => SymbolKind::Enum,
        "type" => SymbolKind::Type,
        "impl" | "extension" => SymbolKind::Impl,
        "mod" | "module" | "namespace" => SymbolKind::Module,
        _ => return None,
    })
}

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid built-in pattern {pattern}: {e}"))
}

const MODIFIERS: &str = r#"(?:(?:export|default|declare|pub(?:\([^)]*\))?|public|private|protected|internal|fileprivate|open|static|final|abstract|sealed|data|partial|override|async|unsafe|const|inline|extern(?:\s+"[^"]*")?)\s+)*"#;

const KEYWORDS: &str = r"function|func|fn|def|fun|class|struct|interface|enum|trait|type|impl|mod|module|namespace|protocol|extension|record|object|union";

fn keyword_symbol() -> SymbolPattern {
    SymbolPattern {
        regex: re(&format!(
            r"^\s*{MODIFIERS}(?P<kw>{KEYWORDS})\b\s*\*?\s*(?:<[^>]*>\s*)?(?P<name>[A-Za-z_$][\w$]*)"
        )),
        kind: None,
    }
}

fn arrow_function_symbol() -> SymbolPattern {
    SymbolPattern {
        regex: re(
            r"^\s*(?:export\s+)?(?:const|let|var)\s+(?P<name>[A-Za-z_$][\w$]*)\s*(?::[^=]+)?=\s*(?:async\s*)?(?:function\b|\([^)]*\)\s*(?::[^=]+)?=>|[A-Za-z_$][\w$]*\s*=>)",
        ),
        kind: Some(SymbolKind::Function),
    }
}

fn c_function_symbol() -> SymbolPattern {
    SymbolPattern {
        regex: re(r"^(?:[\w:<>\*&,\[\]]+\s+)+\**(?P<name>[A-Za-z_][\w:]*)\s*\("),
        kind: Some(SymbolKind::Function),
    }
}

static JS_TS: LazyLock<LanguagePatterns> = LazyLock::new(|| LanguagePatterns {
    declaration: re(
        r"^(?:export\s+(?:default\s+)?)?(?:declare\s+)?(?:async\s+)?(?:abstract\s+)?(?:function\b|class\b|interface\b|type\s+\w|enum\b|const\b|let\b|var\b|namespace\b|module\b)|^@\w|^/\*\*",
    ),
    preamble: Some(re(r"^(?:@\w|/\*\*|\s+\*)")),
    symbols: vec![keyword_symbol(), arrow_function_symbol()],
});

static PYTHON: LazyLock<LanguagePatterns> = LazyLock::new(|| LanguagePatterns {
    declaration: re(r"^(?:async\s+def|def|class)\s|^@\w"),
    preamble: Some(re(r"^@\w")),
    symbols: vec![keyword_symbol()],
});

static RUST: LazyLock<LanguagePatterns> = LazyLock::new(|| LanguagePatterns {
    declaration: re(
        r#"^(?:pub(?:\([^)]*\))?\s+)?(?:(?:async|const|unsafe|default|extern(?:\s+"[^"]*")?)\s+)*(?:fn|struct|enum|trait|impl|mod|type|union|static|const|macro_rules!)\b|^#\[|^///"#,
    ),
    preamble: Some(re(r"^(?:#\[|///)")),
    symbols: vec![keyword_symbol()],
});

static GO: LazyLock<LanguagePatterns> = LazyLock::new(|| LanguagePatterns {
    declaration: re(r"^(?:func|type|var|const)\b|^//"),
    preamble: Some(re(r"^//")),
    symbols: vec![
        SymbolPattern {
            regex: re(r"^func\s*\([^)]*\)\s*(?P<name>[A-Za-z_]\w*)"),
            kind: Some(SymbolKind::Function),
        },
        SymbolPattern {
            regex: re(r"^type\s+(?P<name>[A-Za-z_]\w*)\s+(?P<kw>struct|interface)\b"),
            kind: None,
        },
        keyword_symbol(),
    ],
});

static JVM_LIKE: LazyLock<LanguagePatterns> = LazyLock::new(|| LanguagePatterns {
    declaration: re(
        r"^(?:(?:public|private|protected|internal|static|final|abstract|sealed|open|data|partial|override)\s+)*(?:class|interface|enum|record|object|fun|struct|namespace|trait|@interface)\b|^@\w|^\[\w|^/\*\*",
    ),
    preamble: Some(re(r"^(?:@\w|\[\w|/\*\*|\s+\*)")),
    symbols: vec![keyword_symbol(), c_function_symbol()],
});

static C_FAMILY: LazyLock<LanguagePatterns> = LazyLock::new(|| LanguagePatterns {
    declaration: re(
        r"^(?:template\s*<|class\b|struct\b|namespace\b|enum\b|union\b|typedef\b|(?:static\s+|inline\s+|extern\s+)*[A-Za-z_][\w:<>\*&\s,]*\s+\**[A-Za-z_][\w:]*\s*\()|^/\*\*",
    ),
    preamble: Some(re(r"^(?:template\s*<|/\*\*|\s+\*)")),
    symbols: vec![keyword_symbol(), c_function_symbol()],
});

static RUBY: LazyLock<LanguagePatterns> = LazyLock::new(|| LanguagePatterns {
    declaration: re(r"^(?:def|class|module)\b"),
    preamble: None,
    symbols: vec![keyword_symbol()],
});

static PHP: LazyLock<LanguagePatterns> = LazyLock::new(|| LanguagePatterns {
    declaration: re(r"^(?:(?:abstract|final)\s+)?(?:function|class|interface|trait|enum)\b|^/\*\*"),
    preamble: Some(re(r"^(?:/\*\*|\s+\*)")),
    symbols: vec![keyword_symbol()],
});

static SWIFT: LazyLock<LanguagePatterns> = LazyLock::new(|| LanguagePatterns {
    declaration: re(
        r"^(?:(?:public|private|internal|open|fileprivate|final)\s+)*(?:func|class|struct|enum|protocol|extension)\b|^@\w",
    ),
    preamble: Some(re(r"^@\w")),
    symbols: vec![keyword_symbol()],
});

static GENERIC: LazyLock<LanguagePatterns> = LazyLock::new(|| LanguagePatterns {
    declaration: re(
        r"^(?:export\s+)?(?:pub\s+)?(?:async\s+)?(?:function|func|fn|def|class|struct|interface|enum|trait|type|impl|module)\b",
    ),
    preamble: None,
    symbols: vec![keyword_symbol()],
});

pub fn patterns_for(language: Language) -> &'static LanguagePatterns {
    match language {
        Language::TypeScript | Language::JavaScript => &*JS_TS,
        Language::Python => &*PYTHON,
        Language::Rust => &*RUST,
        Language::Go => &*GO,
        Language::Java | Language::Kotlin | Language::CSharp => &*JVM_LIKE,
        Language::C | Language::Cpp => &*C_FAMILY,
        Language::Ruby => &*RUBY,
        Language::Php => &*PHP,
        Language::Swift => &*SWIFT,
        Language::Markdown | Language::Unknown => &*GENERIC,
    }
}
