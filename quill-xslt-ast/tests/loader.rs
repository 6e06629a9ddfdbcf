use quill_name::QName;
use quill_xslt_ast::{
    load, load_text, CompilerSettings, ErrorCode, MemoryResolver, OutputProperty, Program,
    XslDetail, XslNodeType,
};

const XSL: &str = r#"xmlns:xsl="http://www.w3.org/1999/XSL/Transform""#;

fn stylesheet(body: &str) -> String {
    format!(r#"<xsl:stylesheet version="1.0" {}>{}</xsl:stylesheet>"#, XSL, body)
}

fn load_one(text: &str) -> Program {
    load_text(&MemoryResolver::new(), &CompilerSettings::default(), text)
}

fn codes(program: &Program) -> Vec<ErrorCode> {
    program.diagnostics.iter().map(|d| d.code).collect()
}

#[test]
fn test_import_precedence() {
    let resolver = MemoryResolver::new()
        .with(
            "main.xsl",
            &stylesheet(r#"<xsl:import href="a.xsl"/><xsl:import href="b.xsl"/>"#),
        )
        .with("a.xsl", &stylesheet(""))
        .with("b.xsl", &stylesheet(r#"<xsl:import href="c.xsl"/>"#))
        .with("c.xsl", &stylesheet(""));
    let program = load(&resolver, &CompilerSettings::default(), "main.xsl");
    assert!(program.diagnostics.is_empty(), "{:?}", codes(&program));
    assert_eq!(program.stylesheets.len(), 4);

    let precedence = |uri: &str| {
        let module = program
            .diagnostics
            .modules()
            .iter()
            .position(|m| m == uri)
            .unwrap();
        // every level here holds exactly one module, loaded in level order
        program.stylesheets[module].import_precedence
    };
    assert!(precedence("a.xsl") < precedence("c.xsl"));
    assert!(precedence("c.xsl") < precedence("b.xsl"));
    assert!(precedence("b.xsl") < precedence("main.xsl"));
    assert_eq!(program.principal().import_precedence, precedence("main.xsl"));
    assert_eq!(
        program.imported_levels(program.principal).len(),
        3,
        "imports are transitive"
    );
}

#[test]
fn test_include_shares_level() {
    let resolver = MemoryResolver::new()
        .with(
            "main.xsl",
            &stylesheet(r#"<xsl:include href="inc.xsl"/><xsl:template name="a"/>"#),
        )
        .with("inc.xsl", &stylesheet(r#"<xsl:template name="b"/>"#));
    let program = load(&resolver, &CompilerSettings::default(), "main.xsl");
    assert_eq!(program.stylesheets.len(), 1);
    assert_eq!(program.principal().templates.len(), 2);
    assert_eq!(program.named_templates.len(), 2);
}

#[test]
fn test_circular_include() {
    let resolver = MemoryResolver::new()
        .with("main.xsl", &stylesheet(r#"<xsl:include href="a.xsl"/>"#))
        .with("a.xsl", &stylesheet(r#"<xsl:include href="main.xsl"/>"#));
    let program = load(&resolver, &CompilerSettings::default(), "main.xsl");
    assert_eq!(codes(&program), vec![ErrorCode::XTSE0180]);
}

#[test]
fn test_missing_module() {
    let resolver =
        MemoryResolver::new().with("main.xsl", &stylesheet(r#"<xsl:import href="gone.xsl"/>"#));
    let program = load(&resolver, &CompilerSettings::default(), "main.xsl");
    assert_eq!(codes(&program), vec![ErrorCode::XTSE0165]);
}

#[test]
fn test_import_after_declaration() {
    let resolver = MemoryResolver::new()
        .with(
            "main.xsl",
            &stylesheet(r#"<xsl:template name="t"/><xsl:import href="a.xsl"/>"#),
        )
        .with("a.xsl", &stylesheet(""));
    let program = load(&resolver, &CompilerSettings::default(), "main.xsl");
    assert_eq!(codes(&program), vec![ErrorCode::XTSE0200]);
    // the import is still loaded
    assert_eq!(program.stylesheets.len(), 2);
}

#[test]
fn test_duplicate_named_template() {
    let program = load_one(&stylesheet(
        r#"<xsl:template name="t"/><xsl:template name="t"/>"#,
    ));
    assert_eq!(codes(&program), vec![ErrorCode::XTSE0660]);
}

#[test]
fn test_imported_named_template_is_overridden() {
    let resolver = MemoryResolver::new()
        .with(
            "main.xsl",
            &stylesheet(r#"<xsl:import href="a.xsl"/><xsl:template name="t">main</xsl:template>"#),
        )
        .with("a.xsl", &stylesheet(r#"<xsl:template name="t">a</xsl:template>"#));
    let program = load(&resolver, &CompilerSettings::default(), "main.xsl");
    assert!(program.diagnostics.is_empty());
    let winner = program.named_templates[&QName::unprefixed("t")];
    assert_eq!(program.ast[winner].location.module, 0);
}

#[test]
fn test_simplified_stylesheet() {
    let program = load_one(&format!(
        r#"<html xsl:version="1.0" {}><body><xsl:value-of select="title"/></body></html>"#,
        XSL
    ));
    assert!(program.diagnostics.is_empty());
    let templates = program.principal().mode(None);
    assert_eq!(templates.len(), 1);
    let template = &program.ast[templates[0]];
    assert_eq!(template.arg.as_deref(), Some("/"));
    let body = program.ast.content(templates[0]);
    assert_eq!(program.ast[body[0]].kind, XslNodeType::LiteralElement);
}

#[test]
fn test_simplified_stylesheet_needs_version() {
    let program = load_one(&format!(r#"<html {}/>"#, XSL));
    assert_eq!(codes(&program), vec![ErrorCode::XTSE0150]);
}

#[test]
fn test_forwards_compatible_fallback() {
    let program = load_one(&format!(
        r#"<xsl:stylesheet version="3.5" {}>
<xsl:template match="/">
  <xsl:new-thing><xsl:fallback><xsl:text>old</xsl:text></xsl:fallback></xsl:new-thing>
  <xsl:other-thing/>
</xsl:template>
</xsl:stylesheet>"#,
        XSL
    ));
    assert!(program.diagnostics.is_empty(), "{:?}", codes(&program));
    let template = program.principal().templates[0];
    let content = program.ast.content(template);
    assert_eq!(content.len(), 2);
    assert_eq!(program.ast[content[0]].kind, XslNodeType::List);
    let fallback = program.ast.content(content[0]);
    assert_eq!(program.ast[fallback[0]].arg.as_deref(), Some("old"));
    assert_eq!(program.ast[content[1]].kind, XslNodeType::Error);
}

#[test]
fn test_unknown_instruction_without_forwards_compatibility() {
    let program = load_one(&stylesheet(
        r#"<xsl:template match="/"><xsl:new-thing/></xsl:template>"#,
    ));
    assert_eq!(codes(&program), vec![ErrorCode::XTSE0010]);
}

#[test]
fn test_output_merged_across_levels() {
    let resolver = MemoryResolver::new()
        .with(
            "main.xsl",
            &stylesheet(r#"<xsl:import href="a.xsl"/><xsl:output indent="yes"/>"#),
        )
        .with(
            "a.xsl",
            &stylesheet(r#"<xsl:import href="b.xsl"/><xsl:output method="html" indent="no"/>"#),
        )
        .with(
            "b.xsl",
            &stylesheet(r#"<xsl:output method="text" encoding="latin1"/>"#),
        );
    let program = load(&resolver, &CompilerSettings::default(), "main.xsl");
    assert!(program.diagnostics.is_empty());
    assert_eq!(program.output.method(), Some("html"));
    assert_eq!(program.output.encoding(), Some("latin1"));
    assert!(program.output.indent());
    assert_eq!(program.output.get(OutputProperty::MediaType), None);
}

#[test]
fn test_output_conflict_at_same_precedence() {
    let program = load_one(&stylesheet(
        r#"<xsl:output method="xml"/><xsl:output method="html"/>"#,
    ));
    assert_eq!(codes(&program), vec![ErrorCode::QUILL0101]);
    assert!(!program.diagnostics.has_errors());
    assert_eq!(program.output.method(), Some("html"));
}

#[test]
fn test_nesting_too_deep() {
    let settings = CompilerSettings {
        max_content_depth: 3,
        ..Default::default()
    };
    let nested = "<xsl:if test='1'>".repeat(6) + &"</xsl:if>".repeat(6);
    let program = load_text(
        &MemoryResolver::new(),
        &settings,
        &stylesheet(&format!(r#"<xsl:template match="/">{}</xsl:template>"#, nested)),
    );
    assert_eq!(codes(&program), vec![ErrorCode::QUILL0001]);
}

#[test]
fn test_attribute_errors() {
    let program = load_one(&stylesheet(
        r#"<xsl:template match="/" bogus="1"><xsl:value-of/></xsl:template>"#,
    ));
    let mut found = codes(&program);
    found.sort();
    assert_eq!(found, vec![ErrorCode::XTSE0010, ErrorCode::XTSE0090]);
}

#[test]
fn test_local_variables() {
    let program = load_one(&stylesheet(
        r#"<xsl:template match="/">
<xsl:variable name="x" select="1"/>
<xsl:for-each select="a"><xsl:variable name="x" select="2"/></xsl:for-each>
</xsl:template>"#,
    ));
    assert_eq!(codes(&program), vec![ErrorCode::XTSE0630]);
}

#[test]
fn test_variable_with_select_and_content() {
    let program = load_one(&stylesheet(
        r#"<xsl:variable name="x" select="1">text</xsl:variable>"#,
    ));
    assert_eq!(codes(&program), vec![ErrorCode::XTSE0620]);
    assert_eq!(program.globals.len(), 1);
}

#[test]
fn test_key_declaration() {
    let program = load_one(&stylesheet(r#"<xsl:key name="k" match="item" use="@id"/>"#));
    let keys = &program.keys[&QName::unprefixed("k")];
    assert_eq!(keys.len(), 1);
    assert_eq!(
        program.ast[keys[0]].detail,
        XslDetail::Key {
            match_: "item".to_string(),
            use_: "@id".to_string()
        }
    );
}

#[test]
fn test_literal_namespaces() {
    let program = load_one(&format!(
        r#"<xsl:stylesheet version="1.0" {} xmlns:a="urn:a" xmlns:b="urn:b" exclude-result-prefixes="b">
<xsl:template match="/"><out xmlns:c="urn:c"><inner/></out></xsl:template>
</xsl:stylesheet>"#,
        XSL
    ));
    assert!(program.diagnostics.is_empty());
    let template = program.principal().templates[0];
    let out = program.ast.content(template)[0];
    let XslDetail::LiteralElement { namespaces } = &program.ast[out].detail else {
        panic!("not a literal element");
    };
    let mut prefixes: Vec<&str> = namespaces.iter().map(|(p, _)| p.as_str()).collect();
    prefixes.sort();
    assert_eq!(prefixes, vec!["a", "c"]);
    let inner = program.ast.content(out)[0];
    let XslDetail::LiteralElement { namespaces } = &program.ast[inner].detail else {
        panic!("not a literal element");
    };
    assert!(namespaces.is_empty());
}

#[test]
fn test_exclude_all_skips_rebound_prefix() {
    let program = load_one(&format!(
        r##"<xsl:stylesheet version="1.0" {} xmlns:p="urn:a">
<xsl:template match="/"><out xmlns:p="urn:b" xsl:exclude-result-prefixes="#all"><inner xmlns:q="urn:a"/></out></xsl:template>
</xsl:stylesheet>"##,
        XSL
    ));
    assert!(program.diagnostics.is_empty(), "{:?}", codes(&program));
    let template = program.principal().templates[0];
    let out = program.ast.content(template)[0];
    let XslDetail::LiteralElement { namespaces } = &program.ast[out].detail else {
        panic!("not a literal element");
    };
    assert!(namespaces.is_empty());
    let inner = program.ast.content(out)[0];
    let XslDetail::LiteralElement { namespaces } = &program.ast[inner].detail else {
        panic!("not a literal element");
    };
    assert_eq!(namespaces, &vec![("q".to_string(), "urn:a".to_string())]);
}
