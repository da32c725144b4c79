//
//  mod.rs
//  Codeweave
//

pub mod adapter;
pub mod extractor;
pub mod language;
pub mod tree;

pub use adapter::{adapter_for, ImportRequest, LanguageAdapter, ModuleContext};
pub use extractor::{extract_file, ParsedFile};
pub use language::SupportedLanguage;
pub use tree::{NodeId, ParseOutcome, SyntaxTree};
