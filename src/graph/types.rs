//
//  types.rs
//  Codeweave
//

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

use crate::parser::SupportedLanguage;

// ─── Spans ──────────────────────────────────────────────────

/// Half-open byte range `[start, end)` plus the 1-based lines it covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub start_line: usize,
    pub end_line: usize,
}

impl Span {
    pub fn new(start: usize, end: usize, start_line: usize, end_line: usize) -> Self {
        Self {
            start,
            end,
            start_line,
            end_line,
        }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if `other` lies entirely within this span.
    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn contains_offset(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Text covered by this span, or "" when out of bounds.
    pub fn slice<'a>(&self, text: &'a str) -> &'a str {
        text.get(self.start..self.end).unwrap_or("")
    }
}

// ─── Symbols ────────────────────────────────────────────────

/// Arena-allocated symbol identity. Survives relocation and renames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolId(pub u64);

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sym#{}", self.0)
    }
}

/// Kind tag without payload, used in identity keys and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKindTag {
    Function,
    Class,
    Variable,
    ImportBinding,
}

impl fmt::Display for SymbolKindTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SymbolKindTag::Function => "function",
            SymbolKindTag::Class => "class",
            SymbolKindTag::Variable => "variable",
            SymbolKindTag::ImportBinding => "import",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FunctionInfo {
    pub params: Vec<String>,
    pub is_async: bool,
    pub is_method: bool,
    /// Cyclomatic complexity of the body, nested definitions excluded.
    pub complexity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClassInfo {
    /// Base-class expressions as written.
    pub bases: Vec<String>,
    /// Resolved base classes. Filled in by the resolver.
    pub base_edges: Vec<SymbolId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VariableInfo {
    pub is_constant: bool,
}

/// Syntactic shape of an import binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportForm {
    /// `import a.b` / `import a.b as c`
    Module,
    /// `from m import n` / `import { n } from 'm'`
    Named,
    /// `from m import *` / `export * from 'm'`
    Wildcard,
    /// `import x from 'm'`
    Default,
    /// `import * as ns from 'm'`
    Namespace,
    /// `const x = require('m')`
    Require,
}

/// Why an import or reference could not be bound.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedReason {
    MissingModule(String),
    MissingName { module: String, name: String },
    Dynamic(String),
    Cycle,
}

impl fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnresolvedReason::MissingModule(m) => write!(f, "module `{m}` not found"),
            UnresolvedReason::MissingName { module, name } => {
                write!(f, "`{name}` not found in `{module}`")
            }
            UnresolvedReason::Dynamic(detail) => write!(f, "dynamic: {detail}"),
            UnresolvedReason::Cycle => write!(f, "import chain cycles back on itself"),
        }
    }
}

/// Where an import binding points once resolved.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ImportResolution {
    #[default]
    Pending,
    /// A declaration. `via` lists the intermediate re-export bindings, and
    /// `direct_file` is the file the binding looked the name up in.
    Symbol {
        target: SymbolId,
        via: Vec<SymbolId>,
        direct_file: PathBuf,
    },
    /// A whole module.
    Module(PathBuf),
    /// Every public name of a module, expanded lazily.
    Wildcard(PathBuf),
    /// Several declarations tie; none is chosen.
    Ambiguous(Vec<SymbolId>),
    Unresolved(UnresolvedReason),
}

impl ImportResolution {
    /// File the binding's module specifier resolved to, if any.
    pub fn module_file(&self) -> Option<&PathBuf> {
        match self {
            ImportResolution::Symbol { direct_file, .. } => Some(direct_file),
            ImportResolution::Module(p) | ImportResolution::Wildcard(p) => Some(p),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportBinding {
    /// Module specifier as written (`util`, `.pkg.mod`, `./lib/x`).
    pub module: String,
    /// Name looked up in the module; `None` binds the module itself.
    pub imported: Option<String>,
    /// Name bound in the importing file.
    pub local_name: String,
    pub alias: Option<String>,
    pub form: ImportForm,
    /// Re-exported without binding a local name (`export { a } from 'm'`).
    pub reexport: bool,
    /// Index into the file's import statements.
    pub statement: usize,
    /// `helper` or `helper as h` within the statement.
    pub clause_span: Span,
    /// The imported-name token, when there is one.
    pub imported_span: Option<Span>,
    #[serde(skip)]
    pub resolution: ImportResolution,
}

/// Symbol kind with its capability data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolKind {
    Function(FunctionInfo),
    Class(ClassInfo),
    Variable(VariableInfo),
    ImportBinding(ImportBinding),
}

impl SymbolKind {
    pub fn tag(&self) -> SymbolKindTag {
        match self {
            SymbolKind::Function(_) => SymbolKindTag::Function,
            SymbolKind::Class(_) => SymbolKindTag::Class,
            SymbolKind::Variable(_) => SymbolKindTag::Variable,
            SymbolKind::ImportBinding(_) => SymbolKindTag::ImportBinding,
        }
    }

    pub fn as_import(&self) -> Option<&ImportBinding> {
        match self {
            SymbolKind::ImportBinding(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_import_mut(&mut self) -> Option<&mut ImportBinding> {
        match self {
            SymbolKind::ImportBinding(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<&ClassInfo> {
        match self {
            SymbolKind::Class(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionInfo> {
        match self {
            SymbolKind::Function(f) => Some(f),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

/// Declared attributes that higher layers use for liveness.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Attributes {
    pub decorators: Vec<String>,
    pub visibility: Visibility,
    /// Explicitly exported (`export`, `__all__`, `module.exports`).
    pub exported: bool,
    /// Declared inside a module-level `if`/`try`.
    pub conditional: bool,
}

// ─── Extraction output ──────────────────────────────────────

/// Index of a scope within a file's scope arena.
pub type ScopeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    Module,
    Class,
    Function,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BindingTarget {
    /// A declared symbol (index into the file's symbols).
    Symbol(usize),
    /// A plain local: parameter, loop variable, assignment target.
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalBinding {
    pub target: BindingTarget,
    /// Byte offset of the binding occurrence.
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    /// Symbol owning this scope (function or class).
    pub owner: Option<usize>,
    pub bindings: BTreeMap<String, Vec<LocalBinding>>,
    /// Names declared `global`/`nonlocal` in this scope.
    pub globals: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedSymbol {
    pub name: String,
    pub qualified_name: String,
    pub kind: SymbolKind,
    /// Whole declaration, decorators included.
    pub span: Span,
    pub name_span: Span,
    pub parent: Option<usize>,
    /// Scope the symbol is declared in.
    pub scope: ScopeId,
    /// Scope opened by the symbol's body.
    pub body_scope: Option<ScopeId>,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteKind {
    Reference,
    Call,
    Inherit,
    Decorator,
    /// Name listed in a local export clause.
    Export,
    /// `getattr(base, expr)` / `base[expr]`.
    Computed,
}

/// An unresolved use of a (possibly dotted) name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceSite {
    pub segments: Vec<String>,
    pub segment_spans: Vec<Span>,
    pub span: Span,
    pub kind: SiteKind,
    pub scope: ScopeId,
    /// Innermost declared symbol containing the site.
    pub enclosing: Option<usize>,
}

/// A name constructed at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicSite {
    pub span: Span,
    pub enclosing: Option<usize>,
    pub detail: String,
}

/// `.name` accessed on a receiver the extractor cannot name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberAccess {
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportStatement {
    pub span: Span,
    pub module: String,
    /// Module text inside the statement, quotes excluded.
    pub module_span: Option<Span>,
    /// Binding symbol indices, in source order.
    pub bindings: Vec<usize>,
    /// Executed at import time (not nested in a function).
    pub top_level: bool,
}

/// Name a module exposes to importers (JavaScript export clauses).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportEntry {
    pub exported: String,
    pub local: String,
    pub local_span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParseDiagnostic {
    pub span: Span,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ParseStatus {
    #[default]
    Clean,
    PartialError(Vec<ParseDiagnostic>),
}

impl ParseStatus {
    pub fn is_clean(&self) -> bool {
        matches!(self, ParseStatus::Clean)
    }

    pub fn diagnostics(&self) -> &[ParseDiagnostic] {
        match self {
            ParseStatus::Clean => &[],
            ParseStatus::PartialError(d) => d,
        }
    }
}

/// Everything extracted from one file. Pure function of its text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileExtraction {
    pub path: PathBuf,
    pub language: SupportedLanguage,
    pub status: ParseStatus,
    pub symbols: Vec<ExtractedSymbol>,
    pub scopes: Vec<Scope>,
    pub sites: Vec<ReferenceSite>,
    pub dynamic_sites: Vec<DynamicSite>,
    pub member_accesses: Vec<MemberAccess>,
    pub import_statements: Vec<ImportStatement>,
    pub exports: Vec<ExportEntry>,
    /// Every module-level name is importable (Python).
    pub exports_all_names: bool,
    /// Python `__all__` entries with the span of each string's content.
    pub export_list: Option<Vec<(String, Span)>>,
    pub has_main_guard: bool,
    /// The file runs code at import time beyond declarations.
    pub has_module_code: bool,
    /// Byte offset where new import statements go.
    pub import_insertion: usize,
    pub text_len: usize,
}

impl FileExtraction {
    pub fn empty(path: PathBuf, language: SupportedLanguage) -> Self {
        Self {
            path,
            language,
            status: ParseStatus::Clean,
            symbols: Vec::new(),
            scopes: Vec::new(),
            sites: Vec::new(),
            dynamic_sites: Vec::new(),
            member_accesses: Vec::new(),
            import_statements: Vec::new(),
            exports: Vec::new(),
            exports_all_names: false,
            export_list: None,
            has_main_guard: false,
            has_module_code: false,
            import_insertion: 0,
            text_len: 0,
        }
    }

    /// Module-level symbols named `name`, in declaration order.
    pub fn module_symbols_named<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = (usize, &'a ExtractedSymbol)> + 'a {
        self.symbols
            .iter()
            .enumerate()
            .filter(move |(_, s)| s.scope == 0 && s.parent.is_none() && s.name == name)
    }
}

// ─── Graph nodes and edges ──────────────────────────────────

/// Asks an incremental update to give the symbol at `(file, qualified_name,
/// kind)` an existing id instead of a fresh one. Transactions use it so moved
/// and renamed symbols keep their identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityHint {
    pub id: SymbolId,
    pub file: PathBuf,
    pub qualified_name: String,
    pub kind: SymbolKindTag,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNode {
    pub path: PathBuf,
    pub language: SupportedLanguage,
    pub partial: bool,
}

/// A declared symbol in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: SymbolId,
    pub name: String,
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub file: PathBuf,
    pub span: Span,
    pub name_span: Span,
    pub parent: Option<SymbolId>,
    pub attributes: Attributes,
    /// Position in the owning file's extraction.
    pub index: usize,
}

impl Symbol {
    pub fn is_top_level(&self) -> bool {
        self.parent.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeData {
    File(FileNode),
    Symbol(Symbol),
}

impl NodeData {
    pub fn as_symbol(&self) -> Option<&Symbol> {
        match self {
            NodeData::Symbol(s) => Some(s),
            NodeData::File(_) => None,
        }
    }

    pub fn as_symbol_mut(&mut self) -> Option<&mut Symbol> {
        match self {
            NodeData::Symbol(s) => Some(s),
            NodeData::File(_) => None,
        }
    }

    pub fn file_path(&self) -> &PathBuf {
        match self {
            NodeData::File(f) => &f.path,
            NodeData::Symbol(s) => &s.file,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Declares,
    References,
    Calls,
    Inherits,
    Imports,
}

impl EdgeKind {
    /// Kinds produced by resolution (everything except `Declares`).
    pub fn is_derived(&self) -> bool {
        !matches!(self, EdgeKind::Declares)
    }

    /// Kinds that count as a use of the target.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            EdgeKind::References | EdgeKind::Calls | EdgeKind::Inherits
        )
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EdgeKind::Declares => "declares",
            EdgeKind::References => "references",
            EdgeKind::Calls => "calls",
            EdgeKind::Inherits => "inherits",
            EdgeKind::Imports => "imports",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Certainty {
    #[default]
    Exact,
    Ambiguous,
}

/// The reference site an edge was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SiteRef {
    pub file: PathBuf,
    /// Index into the file's sites, or its symbols for `Imports` edges.
    pub index: usize,
    /// Segment of a dotted site that bound to the target.
    pub segment: usize,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeData {
    pub kind: EdgeKind,
    pub site: Option<SiteRef>,
    /// Import binding the reference went through.
    pub via: Option<SymbolId>,
    pub certainty: Certainty,
}

impl EdgeData {
    pub fn new(kind: EdgeKind) -> Self {
        Self {
            kind,
            site: None,
            via: None,
            certainty: Certainty::Exact,
        }
    }

    pub fn at_site(kind: EdgeKind, site: SiteRef) -> Self {
        Self {
            kind,
            site: Some(site),
            via: None,
            certainty: Certainty::Exact,
        }
    }
}

// ─── Diagnostics and query results ──────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum WarningKind {
    UnresolvedMissing { reason: UnresolvedReason },
    UnresolvedDynamic { detail: String },
    Ambiguous { candidates: Vec<SymbolId> },
    UndefinedName,
}

/// A resolution problem surfaced to callers. Never blocks queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionWarning {
    pub file: PathBuf,
    pub span: Span,
    pub name: String,
    #[serde(flatten)]
    pub kind: WarningKind,
}

impl fmt::Display for ResolutionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: `{}` ", self.file.display(), self.span.start_line, self.name)?;
        match &self.kind {
            WarningKind::UnresolvedMissing { reason } => write!(f, "unresolved ({reason})"),
            WarningKind::UnresolvedDynamic { detail } => write!(f, "unresolved (dynamic: {detail})"),
            WarningKind::Ambiguous { candidates } => {
                write!(f, "ambiguous between {} candidates", candidates.len())
            }
            WarningKind::UndefinedName => write!(f, "is not defined"),
        }
    }
}

/// One use of a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub kind: EdgeKind,
    pub file: PathBuf,
    pub span: Span,
    /// Enclosing symbol of the site; `None` at module level.
    pub from: Option<SymbolId>,
    /// Import binding the use goes through.
    pub via: Option<SymbolId>,
    /// File that binding looked the name up in.
    pub resolved_through: Option<PathBuf>,
    pub certainty: Certainty,
}

/// Summary view of a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub id: SymbolId,
    pub name: String,
    pub qualified_name: String,
    pub kind: SymbolKindTag,
    pub file: PathBuf,
    pub line_start: usize,
    pub line_end: usize,
    pub decorators: Vec<String>,
    pub exported: bool,
}

impl From<&Symbol> for SymbolInfo {
    fn from(s: &Symbol) -> Self {
        Self {
            id: s.id,
            name: s.name.clone(),
            qualified_name: s.qualified_name.clone(),
            kind: s.kind.tag(),
            file: s.file.clone(),
            line_start: s.span.start_line,
            line_end: s.span.end_line,
            decorators: s.attributes.decorators.clone(),
            exported: s.attributes.exported,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnusedImport {
    pub id: SymbolId,
    pub file: PathBuf,
    pub local_name: String,
    pub module: String,
    pub span: Span,
}

/// Graph statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphStats {
    pub file_count: usize,
    pub symbol_count: usize,
    pub import_count: usize,
    pub partial_files: usize,
    pub total_edges: usize,
    pub reference_edges: usize,
    pub call_edges: usize,
    pub inherit_edges: usize,
    pub import_edges: usize,
    pub ambiguous_edges: usize,
    pub warnings: usize,
}
