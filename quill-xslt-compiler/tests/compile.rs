use quill_xpath_ast::{Pattern, DEFAULT_MAX_DEPTH};
use quill_name::QName;
use quill_xslt_ast::{should_strip, CompilerSettings, ErrorCode, MemoryResolver};
use quill_xslt_compiler::{compile, compile_text, default_priority, CompiledStylesheet, Error};
use rust_decimal_macros::dec;

fn stylesheet(version: &str, body: &str) -> String {
    format!(
        r#"<xsl:stylesheet version="{}" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">{}</xsl:stylesheet>"#,
        version, body
    )
}

fn compile_with(settings: &CompilerSettings, text: &str) -> Result<CompiledStylesheet, Error> {
    compile_text(&MemoryResolver::new(), settings, text)
}

fn compile_ok(body: &str) -> CompiledStylesheet {
    match compile_with(&CompilerSettings::default(), &stylesheet("1.0", body)) {
        Ok(compiled) => compiled,
        Err(error) => panic!("compilation failed: {}", error),
    }
}

fn compile_err(body: &str) -> quill_xslt_ast::Diagnostics {
    match compile_with(&CompilerSettings::default(), &stylesheet("1.0", body)) {
        Err(Error::Failed(diagnostics)) => diagnostics,
        Err(error) => panic!("unexpected error: {}", error),
        Ok(_) => panic!("compilation should fail"),
    }
}

fn function_dump(compiled: &CompiledStylesheet, local: &str) -> String {
    let functions = compiled.qil.function_by_local_name(local);
    assert_eq!(functions.len(), 1, "no single function named {}", local);
    compiled.qil.graph.dump_function(functions[0])
}

/// The match template whose body constructs the literal element `local`.
fn template_writing(compiled: &CompiledStylesheet, local: &str) -> String {
    let needle = format!("(ElementCtor '{}", local);
    let found = function_names(compiled)
        .into_iter()
        .filter(|name| name.starts_with("template-"))
        .filter(|name| function_dump(compiled, name).contains(&needle))
        .collect::<Vec<_>>();
    assert_eq!(found.len(), 1, "no single template writing {}", local);
    format!("@quill:{}", found[0])
}

fn function_names(compiled: &CompiledStylesheet) -> Vec<String> {
    compiled
        .qil
        .functions
        .iter()
        .filter_map(|f| compiled.qil.graph.node(*f).function_name())
        .map(|name| name.local_name().to_string())
        .collect()
}

#[test]
fn test_root_applies_templates() {
    let compiled = compile_ok(r#"<xsl:template match="/"><out/></xsl:template>"#);
    insta::assert_snapshot!(
        compiled.qil.graph.dump(compiled.qil.root),
        @"(Invoke @quill:apply-templates (List (XmlContext)))"
    );
}

#[test]
fn test_later_template_wins() {
    let compiled = compile_ok(
        r#"<xsl:template match="a"><first/></xsl:template>
        <xsl:template match="a"><second/></xsl:template>"#,
    );
    let dispatcher = function_dump(&compiled, "apply-templates");
    assert!(dispatcher.contains("@quill:template-2"));
    assert!(!dispatcher.contains("@quill:template-1"));
}

#[test]
fn test_explicit_priority_beats_specific_name() {
    let compiled = compile_ok(
        r#"<xsl:template match="item"><item/></xsl:template>
        <xsl:template match="*" priority="1"><any/></xsl:template>"#,
    );
    let dispatcher = function_dump(&compiled, "apply-templates");
    assert!(dispatcher.contains("@quill:template-2"));
    assert!(!dispatcher.contains("@quill:template-1"));

    let compiled = compile_ok(
        r#"<xsl:template match="item"><item/></xsl:template>
        <xsl:template match="*"><any/></xsl:template>"#,
    );
    let dispatcher = function_dump(&compiled, "apply-templates");
    assert!(dispatcher.contains("@quill:template-1"));
    assert!(dispatcher.contains("@quill:template-2"));
}

#[test]
fn test_default_priorities() {
    let mut namespaces = quill_name::Namespaces::default();
    namespaces.add("ns", "urn:ns");
    let priorities = |text: &str| {
        let pattern = Pattern::parse(text, &namespaces, DEFAULT_MAX_DEPTH).unwrap();
        let priorities = default_priority(&pattern)
            .map(|(_, priority)| priority)
            .collect::<Vec<_>>();
        priorities
    };
    assert_eq!(priorities("item"), vec![dec!(0)]);
    assert_eq!(priorities("*"), vec![dec!(-0.5)]);
    assert_eq!(priorities("ns:*"), vec![dec!(-0.25)]);
    assert_eq!(priorities("ns:item"), vec![dec!(0)]);
    assert_eq!(priorities("node()"), vec![dec!(-0.5)]);
    assert_eq!(priorities("list/item"), vec![dec!(0.5)]);
    assert_eq!(priorities("item | text()"), vec![dec!(0), dec!(-0.5)]);
}

#[test]
fn test_template_without_focus_has_no_formals() {
    let compiled = compile_ok(
        r#"<xsl:template name="t"><xsl:value-of select="'x'"/></xsl:template>
        <xsl:template match="/"><xsl:call-template name="t"/></xsl:template>"#,
    );
    let dump = function_dump(&compiled, "t");
    assert!(dump.starts_with("(Function @t () "), "{}", dump);
}

#[test]
fn test_template_using_position_gets_focus() {
    let compiled = compile_ok(
        r#"<xsl:template match="item"><xsl:value-of select="position()"/></xsl:template>"#,
    );
    let dump = function_dump(&compiled, "template-1");
    assert!(!dump.starts_with("(Function @quill:template-1 () "), "{}", dump);
}

#[test]
fn test_attribute_set_cycles() {
    let diagnostics = compile_err(
        r#"<xsl:attribute-set name="one" use-attribute-sets="one"/>
        <xsl:attribute-set name="two-a" use-attribute-sets="two-b"/>
        <xsl:attribute-set name="two-b" use-attribute-sets="two-a"/>
        <xsl:attribute-set name="five-a" use-attribute-sets="five-b"/>
        <xsl:attribute-set name="five-b" use-attribute-sets="five-c"/>
        <xsl:attribute-set name="five-c" use-attribute-sets="five-d"/>
        <xsl:attribute-set name="five-d" use-attribute-sets="five-e"/>
        <xsl:attribute-set name="five-e" use-attribute-sets="five-a"/>
        <xsl:template match="/"><out/></xsl:template>"#,
    );
    assert_eq!(diagnostics.with_code(ErrorCode::XTSE0720).count(), 3);
}

#[test]
fn test_highest_import_precedence_output_wins() {
    let resolver = MemoryResolver::new()
        .with(
            "main.xsl",
            &stylesheet(
                "1.0",
                r#"<xsl:import href="a.xsl"/><xsl:import href="b.xsl"/>
                <xsl:template match="/"><out/></xsl:template>"#,
            ),
        )
        .with(
            "a.xsl",
            &stylesheet(
                "1.0",
                r#"<xsl:import href="c.xsl"/><xsl:output encoding="ISO-8859-1"/>"#,
            ),
        )
        .with("b.xsl", &stylesheet("1.0", r#"<xsl:output encoding="UTF-16"/>"#))
        .with("c.xsl", &stylesheet("1.0", r#"<xsl:output encoding="US-ASCII"/>"#));
    let compiled = compile(&resolver, &CompilerSettings::default(), "main.xsl").unwrap();
    assert_eq!(compiled.output.encoding(), Some("UTF-16"));

    let resolver = resolver.with(
        "main.xsl",
        &stylesheet(
            "1.0",
            r#"<xsl:import href="a.xsl"/><xsl:import href="b.xsl"/><xsl:output encoding="UTF-8"/>
            <xsl:template match="/"><out/></xsl:template>"#,
        ),
    );
    let compiled = compile(&resolver, &CompilerSettings::default(), "main.xsl").unwrap();
    assert_eq!(compiled.output.encoding(), Some("UTF-8"));
}

#[test]
fn test_missing_import_is_reported() {
    let diagnostics = compile_err(r#"<xsl:import href="missing.xsl"/>"#);
    assert!(diagnostics.has_errors());
}

#[test]
fn test_simplified_stylesheet() {
    let text = r#"<out xsl:version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform" a="1"><xsl:value-of select="2"/></out>"#;
    let compiled = compile_with(&CompilerSettings::default(), text).unwrap();
    let template = function_dump(&compiled, "template-1");
    assert!(template.contains("(ElementCtor 'out"), "{}", template);
    assert!(template.contains("(AttributeCtor 'a"), "{}", template);
    let dispatcher = function_dump(&compiled, "apply-templates");
    assert!(dispatcher.contains("@quill:template-1"));
}

#[test]
fn test_forwards_compatible_unknown_instruction() {
    let text = stylesheet(
        "1.1",
        r#"<xsl:template match="/"><xsl:frobnicate/><out/></xsl:template>"#,
    );
    assert!(compile_with(&CompilerSettings::default(), &text).is_ok());

    let text = stylesheet(
        "1.0",
        r#"<xsl:template match="/"><xsl:frobnicate/><out/></xsl:template>"#,
    );
    assert!(compile_with(&CompilerSettings::default(), &text).is_err());
}

#[test]
fn test_split_template_keeps_variables() {
    let mut body = String::from(r#"<xsl:template match="/"><xsl:variable name="v" select="'x'"/>"#);
    for i in 0..20 {
        body.push_str(&format!(r#"<e{}><xsl:value-of select="$v"/></e{}>"#, i, i));
    }
    body.push_str("</xsl:template>");
    let settings = CompilerSettings {
        split_threshold: Some(10),
        ..Default::default()
    };
    let compiled = compile_with(&settings, &stylesheet("1.0", &body)).unwrap();
    let split = function_names(&compiled)
        .into_iter()
        .filter(|name| name.starts_with("split-"))
        .collect::<Vec<_>>();
    assert!(!split.is_empty());
    for name in &split {
        let dump = function_dump(&compiled, name);
        assert!(dump.contains("$v"), "{}", dump);
    }

    let unsplit = CompilerSettings {
        split_threshold: None,
        ..Default::default()
    };
    let compiled = compile_with(&unsplit, &stylesheet("1.0", &body)).unwrap();
    assert!(!function_names(&compiled).iter().any(|name| name.starts_with("split-")));
}

#[test]
fn test_unknown_key_is_an_error() {
    let diagnostics = compile_err(
        r#"<xsl:template match="/"><xsl:copy-of select="key('nothing', 'a')"/></xsl:template>"#,
    );
    assert_eq!(diagnostics.with_code(ErrorCode::XTDE1260).count(), 1);
}

#[test]
fn test_apply_imports_inside_for_each() {
    let diagnostics = compile_err(
        r#"<xsl:template match="a"><xsl:for-each select="*"><xsl:apply-imports/></xsl:for-each></xsl:template>"#,
    );
    assert_eq!(diagnostics.with_code(ErrorCode::XTSE0010).count(), 1);
}

#[test]
fn test_apply_imports_in_named_template() {
    let diagnostics = compile_err(r#"<xsl:template name="t"><xsl:apply-imports/></xsl:template>"#);
    assert_eq!(diagnostics.with_code(ErrorCode::XTSE0010).count(), 1);
}

#[test]
fn test_warnings_as_errors() {
    let text = stylesheet(
        "1.1",
        r#"<xsl:template match="/"><xsl:value-of select="1 +"/></xsl:template>"#,
    );
    let compiled = compile_with(&CompilerSettings::default(), &text).unwrap();
    assert_eq!(compiled.diagnostics.with_code(ErrorCode::XPST0003).count(), 1);
    assert!(!compiled.diagnostics.has_errors());

    let settings = CompilerSettings {
        treat_warnings_as_errors: true,
        ..Default::default()
    };
    let Err(Error::Failed(diagnostics)) = compile_with(&settings, &text) else {
        panic!("warnings should fail the compilation");
    };
    assert_eq!(diagnostics.error_count(), 1);
}

#[test]
fn test_later_template_wins_in_named_mode() {
    let compiled = compile_ok(
        r#"<xsl:template match="/"><xsl:apply-templates mode="m"/></xsl:template>
        <xsl:template match="a" mode="m"><first/></xsl:template>
        <xsl:template match="a" mode="m"><second/></xsl:template>
        <xsl:template match="a"><unmoded/></xsl:template>"#,
    );
    let dispatcher = function_dump(&compiled, "apply-templates-m");
    assert!(dispatcher.contains(&template_writing(&compiled, "second")));
    assert!(!dispatcher.contains(&template_writing(&compiled, "first")));
    assert!(!dispatcher.contains(&template_writing(&compiled, "unmoded")));

    let dispatcher = function_dump(&compiled, "apply-templates");
    assert!(dispatcher.contains(&template_writing(&compiled, "unmoded")));
    assert!(!dispatcher.contains(&template_writing(&compiled, "second")));
}

#[test]
fn test_later_attribute_rule_wins() {
    let compiled = compile_ok(
        r#"<xsl:template match="@a"><first/></xsl:template>
        <xsl:template match="@a"><second/></xsl:template>
        <xsl:template match="*" priority="5"><element/></xsl:template>"#,
    );
    let dispatcher = function_dump(&compiled, "apply-templates");
    assert!(dispatcher.contains(&template_writing(&compiled, "second")));
    assert!(!dispatcher.contains(&template_writing(&compiled, "first")));
    // a higher priority rule for elements does not hide attribute rules
    assert!(dispatcher.contains(&template_writing(&compiled, "element")));
}

#[test]
fn test_later_text_rule_wins() {
    let compiled = compile_ok(
        r#"<xsl:template match="text()"><first/></xsl:template>
        <xsl:template match="text()"><second/></xsl:template>"#,
    );
    let dispatcher = function_dump(&compiled, "apply-templates");
    assert!(dispatcher.contains(&template_writing(&compiled, "second")));
    assert!(!dispatcher.contains(&template_writing(&compiled, "first")));
}

#[test]
fn test_later_included_template_wins() {
    let included = stylesheet("1.0", r#"<xsl:template match="a"><included/></xsl:template>"#);
    let resolver = MemoryResolver::new()
        .with(
            "main.xsl",
            &stylesheet(
                "1.0",
                r#"<xsl:template match="a"><main/></xsl:template><xsl:include href="x.xsl"/>"#,
            ),
        )
        .with("x.xsl", &included);
    let compiled = compile(&resolver, &CompilerSettings::default(), "main.xsl").unwrap();
    let dispatcher = function_dump(&compiled, "apply-templates");
    assert!(dispatcher.contains(&template_writing(&compiled, "included")));
    assert!(!dispatcher.contains(&template_writing(&compiled, "main")));

    let resolver = resolver.with(
        "main.xsl",
        &stylesheet(
            "1.0",
            r#"<xsl:include href="x.xsl"/><xsl:template match="a"><main/></xsl:template>"#,
        ),
    );
    let compiled = compile(&resolver, &CompilerSettings::default(), "main.xsl").unwrap();
    let dispatcher = function_dump(&compiled, "apply-templates");
    assert!(dispatcher.contains(&template_writing(&compiled, "main")));
    assert!(!dispatcher.contains(&template_writing(&compiled, "included")));
}

#[test]
fn test_whitespace_rules_across_imports() {
    let resolver = MemoryResolver::new()
        .with(
            "main.xsl",
            &stylesheet(
                "1.0",
                r#"<xsl:import href="a.xsl"/><xsl:strip-space elements="x"/>
                <xsl:template match="/"><out/></xsl:template>"#,
            ),
        )
        .with(
            "a.xsl",
            &stylesheet(
                "1.0",
                r#"<xsl:import href="b.xsl"/><xsl:preserve-space elements="c"/>"#,
            ),
        )
        .with(
            "b.xsl",
            &stylesheet(
                "1.0",
                r#"<xsl:import href="c.xsl"/><xsl:strip-space elements="*"/><xsl:preserve-space elements="b"/>"#,
            ),
        )
        .with(
            "c.xsl",
            &stylesheet(
                "1.0",
                r#"<xsl:strip-space elements="a b c"/><xsl:preserve-space elements="y"/>"#,
            ),
        );
    let compiled = compile(&resolver, &CompilerSettings::default(), "main.xsl").unwrap();
    let strip = |local: &str| should_strip(&compiled.whitespace_rules, &QName::unprefixed(local));
    assert!(strip("x"));
    assert!(strip("a"));
    assert!(!strip("b"));
    assert!(!strip("c"));
    // a name test in a lower level loses to `*` in a higher one
    assert!(strip("y"));
    assert!(strip("z"));
}

#[test]
fn test_split_passes_shadowing_and_namespaced_variables() {
    let mut body = String::from(
        r#"<xsl:variable name="v" select="'global'"/>
        <xsl:template match="/"><xsl:variable name="v" select="'local'"/><xsl:variable name="n:w" select="'nw'"/>"#,
    );
    for i in 0..20 {
        body.push_str(&format!(
            r#"<e{}><xsl:value-of select="concat($v, $n:w)"/></e{}>"#,
            i, i
        ));
    }
    body.push_str("</xsl:template>");
    let text = format!(
        r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform" xmlns:n="urn:n">{}</xsl:stylesheet>"#,
        body
    );
    let settings = CompilerSettings {
        split_threshold: Some(10),
        ..Default::default()
    };
    let compiled = compile_with(&settings, &text).unwrap();
    let split = function_names(&compiled)
        .into_iter()
        .filter(|name| name.starts_with("split-"))
        .collect::<Vec<_>>();
    assert!(!split.is_empty());
    for name in &split {
        let dump = function_dump(&compiled, name);
        let formals = &dump[..dump.find(") ").unwrap()];
        assert!(formals.contains("$v"), "{}", dump);
        assert!(formals.contains("$n:w"), "{}", dump);
    }
    let head = function_dump(&compiled, "template-1");
    assert!(head.contains(r#""local""#), "{}", head);
    assert!(!head.contains(r#""global""#), "{}", head);
}

#[test]
fn test_apply_imports_is_not_split_off() {
    let mut elements = String::new();
    for _ in 0..150 {
        elements.push_str("<e/>");
    }
    for content in [
        format!("{}<xsl:apply-imports/>", elements),
        format!("{}<wrapper><xsl:apply-imports/></wrapper>", elements),
    ] {
        let compiled = compile_ok(&format!(
            r#"<xsl:template match="a">{}</xsl:template>"#,
            content
        ));
        assert!(!function_names(&compiled)
            .iter()
            .any(|name| name.starts_with("split-")));
    }

    // what follows the apply-imports can still be split off
    let compiled = compile_ok(&format!(
        r#"<xsl:template match="a"><xsl:apply-imports/>{}</xsl:template>"#,
        elements
    ));
    let split = function_names(&compiled)
        .into_iter()
        .filter(|name| name.starts_with("split-"))
        .collect::<Vec<_>>();
    assert!(!split.is_empty());
    for name in &split {
        assert!(!function_dump(&compiled, name).contains("@quill:apply-imports"));
    }
}

#[test]
fn test_diagnostics_are_sorted() {
    let text = r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
<xsl:template match="/"><xsl:value-of select="1 +"/></xsl:template>


<xsl:template match="b" frequency="1"><out/></xsl:template>
</xsl:stylesheet>"#;
    let Err(Error::Failed(diagnostics)) = compile_with(&CompilerSettings::default(), text) else {
        panic!("compilation should fail");
    };
    let found = diagnostics
        .iter()
        .map(|d| (d.line, d.code))
        .collect::<Vec<_>>();
    assert_eq!(
        found,
        vec![(2, ErrorCode::XPST0003), (5, ErrorCode::XTSE0090)]
    );
}
