use log::{debug, warn};
use scraper::{ElementRef, Html, Selector};
use shared::{now_millis, ProblemRecord};

use crate::surface::PageSurface;

pub static DEFAULT_TITLE: &str = "Untitled Problem";
pub static DEFAULT_DESCRIPTION: &str = "No description available";
pub static DEFAULT_LANGUAGE: &str = "Unknown";

#[derive(Debug)]
pub enum Error {
    /// No strategy recovered a non-blank solution body. There is no safe
    /// default for code, so the whole extraction fails.
    MissingCode,
}

/// How the matched node is turned into a value.
#[derive(Debug, Clone, Copy)]
enum Value {
    /// Trimmed text fragments joined with single spaces.
    Text,
    /// Concatenated text exactly as rendered. Used for code, where
    /// whitespace is load-bearing.
    RawText,
    /// Inner markup of the node.
    Markup,
}

/// One extraction tier. Tiers are tried in order and the first non-blank
/// value wins; the page markup varies across site versions, so the
/// redundancy is a correctness requirement.
struct DomStrategy {
    description: &'static str,
    selector: &'static str,
    value: Value,
}

static TITLE_STRATEGIES: &[DomStrategy] = &[
    DomStrategy {
        description: "question title locator",
        selector: r#"[data-cy="question-title"]"#,
        value: Value::Text,
    },
    DomStrategy {
        description: "question title class",
        selector: r#"[class*="question-title"]"#,
        value: Value::Text,
    },
    DomStrategy {
        description: "page heading",
        selector: "h1",
        value: Value::Text,
    },
    DomStrategy {
        description: "legacy title class",
        selector: ".css-v3d350",
        value: Value::Text,
    },
];

static DESCRIPTION_STRATEGIES: &[DomStrategy] = &[
    DomStrategy {
        description: "prose container",
        selector: ".prose",
        value: Value::Markup,
    },
    DomStrategy {
        description: "generated description class",
        selector: r#"[class*="elfjS"]"#,
        value: Value::Markup,
    },
    DomStrategy {
        description: "question content class",
        selector: r#"[class*="question-content"]"#,
        value: Value::Markup,
    },
];

static CODE_STRATEGIES: &[DomStrategy] = &[
    DomStrategy {
        description: "code block",
        selector: "pre code",
        value: Value::RawText,
    },
    DomStrategy {
        description: "editor container",
        selector: ".monaco-editor",
        value: Value::RawText,
    },
    DomStrategy {
        description: "code area class",
        selector: r#"[class*="code-area"]"#,
        value: Value::RawText,
    },
];

static LANGUAGE_STRATEGIES: &[DomStrategy] = &[
    DomStrategy {
        description: "language listbox button",
        selector: r#"button[id^="headlessui-listbox-button-"]"#,
        value: Value::Text,
    },
    DomStrategy {
        description: "language select class",
        selector: r#"[class*="lang-select"]"#,
        value: Value::Text,
    },
    DomStrategy {
        description: "language picker class",
        selector: r#"[class*="language-picker"]"#,
        value: Value::Text,
    },
    DomStrategy {
        description: "language button label",
        selector: r#"button[aria-label*="language"]"#,
        value: Value::Text,
    },
];

static RESULT_STRATEGIES: &[DomStrategy] = &[
    DomStrategy {
        description: "submission result locator",
        selector: r#"[data-e2e-locator="submission-result"]"#,
        value: Value::Text,
    },
    DomStrategy {
        description: "submission result class",
        selector: r#"[class*="submission-result"]"#,
        value: Value::Text,
    },
    DomStrategy {
        description: "result state class",
        selector: r#"[class*="result-state"]"#,
        value: Value::Text,
    },
    DomStrategy {
        description: "legacy success class",
        selector: ".result__success",
        value: Value::Text,
    },
];

fn collapsed_text(element: ElementRef) -> String {
    element
        .text()
        .map(|fragment| fragment.trim())
        .filter(|fragment| !fragment.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_dom_value(html: &Html, strategies: &[DomStrategy]) -> Option<String> {
    for strategy in strategies {
        let Ok(selector) = Selector::parse(strategy.selector) else {
            warn!("Unusable selector for {}", strategy.description);
            continue;
        };
        let Some(element) = html.select(&selector).next() else {
            continue;
        };
        let value = match strategy.value {
            Value::Text => collapsed_text(element),
            Value::RawText => element.text().collect::<String>(),
            Value::Markup => element.inner_html(),
        };
        if !value.trim().is_empty() {
            debug!("Matched {}", strategy.description);
            return Some(value);
        }
    }
    None
}

static LANGUAGE_EXTENSIONS: &[(&str, &str)] = &[
    ("JavaScript", ".js"),
    ("TypeScript", ".ts"),
    ("Python", ".py"),
    ("Python3", ".py"),
    ("Java", ".java"),
    ("C++", ".cpp"),
    ("C", ".c"),
    ("C#", ".cs"),
    ("Ruby", ".rb"),
    ("Go", ".go"),
    ("Swift", ".swift"),
    ("Kotlin", ".kt"),
    ("Rust", ".rs"),
    ("PHP", ".php"),
    ("Scala", ".scala"),
    ("R", ".r"),
    ("Perl", ".pl"),
    ("Elixir", ".ex"),
    ("Erlang", ".erl"),
    ("Racket", ".rkt"),
    ("Dart", ".dart"),
    ("Bash", ".sh"),
    ("Shell", ".sh"),
    ("MySQL", ".sql"),
    ("MS SQL Server", ".sql"),
    ("Oracle", ".sql"),
    ("PostgreSQL", ".sql"),
    ("Haskell", ".hs"),
    ("Clojure", ".clj"),
    ("F#", ".fs"),
    ("OCaml", ".ml"),
    ("Lua", ".lua"),
    ("Julia", ".jl"),
    ("VB.NET", ".vb"),
    ("Groovy", ".groovy"),
    ("Objective-C", ".m"),
    ("Pascal", ".pas"),
    ("Prolog", ".pl"),
    ("Scheme", ".scm"),
];

// Informal spellings seen in the wild. Keys are matched after lowercasing
// and removing whitespace.
static LANGUAGE_ALIASES: &[(&str, &str)] = &[
    ("py", ".py"),
    ("python2", ".py"),
    ("js", ".js"),
    ("ts", ".ts"),
    ("cpp", ".cpp"),
    ("c++", ".cpp"),
    ("csharp", ".cs"),
    ("golang", ".go"),
    ("rust-lang", ".rs"),
];

/// File extension for a language name, ".txt" when unrecognized.
pub fn extension_for(language: &str) -> &'static str {
    let trimmed = language.trim();
    if trimmed.is_empty() {
        return ".txt";
    }
    for (name, extension) in LANGUAGE_EXTENSIONS {
        if name.eq_ignore_ascii_case(trimmed) {
            return extension;
        }
    }
    let compact = trimmed
        .to_lowercase()
        .split_whitespace()
        .collect::<String>();
    for (alias, extension) in LANGUAGE_ALIASES {
        if *alias == compact {
            return extension;
        }
    }
    ".txt"
}

/// Filesystem-safe identifier derived from a problem title: lowercase,
/// [a-z0-9] only, whitespace and hyphen runs collapse to one interior
/// hyphen.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;
    for character in title.to_lowercase().chars() {
        if character.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(character);
        } else if character.is_whitespace() || character == '-' {
            pending_hyphen = true;
        }
    }
    slug
}

/// The rendered result node confirms the submission was accepted.
pub fn verify_accepted(surface: &PageSurface) -> bool {
    let html = Html::parse_document(&surface.document);
    match first_dom_value(&html, RESULT_STRATEGIES) {
        Some(text) => text.to_lowercase().contains("accepted"),
        None => {
            warn!("Could not find a submission result on the page");
            false
        }
    }
}

fn editor_code(surface: &PageSurface) -> Option<String> {
    let editor = surface.editor.as_ref()?;
    if editor.trim().is_empty() {
        return None;
    }
    debug!("Code taken from the editor model");
    Some(editor.clone())
}

/// Scrape a problem record out of the page snapshot. `endpoint_language` is
/// the language reported by the check endpoint and takes precedence over
/// anything on the page.
pub fn problem_record(
    surface: &PageSurface,
    endpoint_language: Option<&str>,
) -> Result<ProblemRecord, Error> {
    let html = Html::parse_document(&surface.document);

    let title =
        first_dom_value(&html, TITLE_STRATEGIES).unwrap_or_else(|| DEFAULT_TITLE.to_string());
    let description = first_dom_value(&html, DESCRIPTION_STRATEGIES)
        .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string());

    let code = match editor_code(surface).or_else(|| first_dom_value(&html, CODE_STRATEGIES)) {
        Some(code) => code,
        None => return Err(Error::MissingCode),
    };

    let language = endpoint_language
        .map(str::trim)
        .filter(|language| !language.is_empty())
        .map(str::to_string)
        .or_else(|| first_dom_value(&html, LANGUAGE_STRATEGIES))
        .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());

    let extension = extension_for(&language).to_string();
    let mut slug = slugify(&title);
    if slug.is_empty() {
        slug = slugify(DEFAULT_TITLE);
    }

    Ok(ProblemRecord {
        title,
        description,
        code,
        language,
        extension,
        slug,
        url: surface.url.clone(),
        timestamp: now_millis(),
    })
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn surface(document: &str, editor: Option<&str>) -> PageSurface {
        PageSurface {
            document: document.to_string(),
            editor: editor.map(str::to_string),
            url: Some("https://leetcode.com/problems/two-sum/".to_string()),
        }
    }

    static FULL_PAGE: &str = r#"<html><body>
        <div data-e2e-locator="submission-result">Accepted</div>
        <div data-cy="question-title">Two Sum</div>
        <div class="prose"><p>Given an array of integers...</p></div>
        <pre><code>def f():
    pass</code></pre>
        <button id="headlessui-listbox-button-1">Python3</button>
    </body></html>"#;

    #[test_case("Two Sum", "two-sum"; "simple title")]
    #[test_case("Best Time to Buy and Sell Stock", "best-time-to-buy-and-sell-stock"; "long title")]
    #[test_case("3Sum", "3sum"; "leading digit")]
    #[test_case("Pow(x, n)", "powx-n"; "punctuation stripped")]
    #[test_case("  Median of Two Sorted Arrays  ", "median-of-two-sorted-arrays"; "edges trimmed")]
    #[test_case("A -- B", "a-b"; "hyphen runs collapsed")]
    #[test_case("!!!", ""; "nothing left")]
    fn slugify(input: &str, output: &str) {
        assert_eq!(super::slugify(input), output);
    }

    #[test_case("Two Sum"; "plain")]
    #[test_case("Pow(x, n)"; "punctuated")]
    fn slugify_is_idempotent(title: &str) {
        let slug = super::slugify(title);
        assert_eq!(super::slugify(&slug), slug);
    }

    #[test_case("Python3", ".py"; "exact")]
    #[test_case("python3", ".py"; "case insensitive")]
    #[test_case("C++", ".cpp"; "symbols")]
    #[test_case("MS SQL Server", ".sql"; "spaces")]
    #[test_case("golang", ".go"; "alias")]
    #[test_case("py", ".py"; "short alias")]
    #[test_case(" Rust ", ".rs"; "padded")]
    #[test_case("Brainfuck", ".txt"; "unknown")]
    #[test_case("", ".txt"; "empty")]
    fn extension_for(language: &str, extension: &str) {
        assert_eq!(super::extension_for(language), extension);
    }

    #[test]
    fn full_page_extracts_every_field() {
        let record = problem_record(&surface(FULL_PAGE, None), Some("Python3")).unwrap();
        assert_eq!(record.title, "Two Sum");
        assert_eq!(record.description, "<p>Given an array of integers...</p>");
        assert_eq!(record.code, "def f():\n    pass");
        assert_eq!(record.language, "Python3");
        assert_eq!(record.extension, ".py");
        assert_eq!(record.slug, "two-sum");
        assert!(record.url.is_some());
    }

    #[test]
    fn editor_model_wins_over_rendered_code() {
        let record = problem_record(&surface(FULL_PAGE, Some("x = 1\n")), Some("Python3")).unwrap();
        assert_eq!(record.code, "x = 1\n");
    }

    #[test]
    fn blank_editor_model_falls_back_to_the_page() {
        let record = problem_record(&surface(FULL_PAGE, Some("   \n")), Some("Python3")).unwrap();
        assert_eq!(record.code, "def f():\n    pass");
    }

    #[test]
    fn title_falls_back_to_the_heading() {
        let page = r#"<html><body><h1>Add Two Numbers</h1>
            <pre><code>code</code></pre></body></html>"#;
        let record = problem_record(&surface(page, None), None).unwrap();
        assert_eq!(record.title, "Add Two Numbers");
        assert_eq!(record.slug, "add-two-numbers");
    }

    #[test]
    fn missing_title_and_description_use_defaults() {
        let page = "<html><body><pre><code>code</code></pre></body></html>";
        let record = problem_record(&surface(page, None), None).unwrap();
        assert_eq!(record.title, DEFAULT_TITLE);
        assert_eq!(record.description, DEFAULT_DESCRIPTION);
        assert_eq!(record.language, DEFAULT_LANGUAGE);
        assert_eq!(record.extension, ".txt");
        assert_eq!(record.slug, "untitled-problem");
    }

    #[test]
    fn missing_code_fails_extraction() {
        let page = r#"<html><body><div data-cy="question-title">Two Sum</div></body></html>"#;
        assert!(matches!(
            problem_record(&surface(page, None), None),
            Err(Error::MissingCode)
        ));
    }

    #[test]
    fn whitespace_only_code_fails_extraction() {
        let page = "<html><body><pre><code>   \n\t</code></pre></body></html>";
        assert!(matches!(
            problem_record(&surface(page, None), None),
            Err(Error::MissingCode)
        ));
    }

    #[test]
    fn page_language_used_when_endpoint_is_silent() {
        let record = problem_record(&surface(FULL_PAGE, None), None).unwrap();
        assert_eq!(record.language, "Python3");
    }

    #[test]
    fn verify_accepted_reads_the_result_node() {
        assert!(verify_accepted(&surface(FULL_PAGE, None)));
        let rejected = r#"<html><body>
            <div data-e2e-locator="submission-result">Wrong Answer</div>
        </body></html>"#;
        assert!(!verify_accepted(&surface(rejected, None)));
        assert!(!verify_accepted(&surface("<html><body></body></html>", None)));
    }
}
