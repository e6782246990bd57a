use groovyscope_api::{Severity, SymbolKind};
use groovyscope_groovy::{extract_symbols, parse};
use std::path::Path;

const SERVICE: &str = r#"
package com.acme.billing

import com.acme.model.Invoice
import com.acme.model.*
import static java.util.Collections.emptyList
import java.time.LocalDate as Date

/**
 * Computes totals.
 */
@groovy.transform.CompileStatic
class InvoiceService implements Serializable {
    private static final BigDecimal TAX = 0.2
    private List<Invoice> invoices = []
    String region

    InvoiceService(String region) {
        this.region = region
    }

    BigDecimal total(Date since) {
        invoices.findAll { it.date >= since }
                .collect { it.amount * (1 + TAX) }
                .sum() ?: 0
    }

    static class Summary {
        int count
    }
}
"#;

#[test]
fn parses_and_extracts_a_service_class() {
    let path = Path::new("/ws/src/main/groovy/com/acme/billing/InvoiceService.groovy");
    let out = parse(SERVICE, &path.to_string_lossy());
    assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
    assert_eq!(out.module.imports.len(), 4);
    assert!(out.module.imports[1].is_star);
    assert!(out.module.imports[2].is_static);
    assert_eq!(out.module.imports[3].alias.as_deref(), Some("Date"));

    let records = extract_symbols(&out.module, path);
    let find = |name: &str| records.iter().find(|r| r.qualified_name == name);

    assert_eq!(
        find("com.acme.billing.InvoiceService").map(|r| r.kind),
        Some(SymbolKind::Class)
    );
    assert_eq!(
        find("com.acme.billing.InvoiceService.TAX").map(|r| r.kind),
        Some(SymbolKind::Field)
    );
    assert_eq!(
        find("com.acme.billing.InvoiceService.region").map(|r| r.kind),
        Some(SymbolKind::Property)
    );
    assert!(find("com.acme.billing.InvoiceService.<init>").is_some());
    assert!(find("com.acme.billing.InvoiceService.total").is_some());
    assert!(find("com.acme.billing.InvoiceService$Summary.count").is_some());
    assert!(find("com.acme.billing.InvoiceService.<closure>").is_some());
    assert!(records.iter().all(|r| r.location.line >= 1 && r.location.column >= 1));
}

#[test]
fn broken_input_still_yields_partial_symbols() {
    let source = "class Good {\n  void ok() {}\n}\nclass Bad {\n  void broken( {\n";
    let out = parse(source, "Broken.groovy");
    assert!(out.has_errors());
    assert!(out.diagnostics.iter().all(|d| d.severity == Severity::Syntax));

    let records = extract_symbols(&out.module, Path::new("Broken.groovy"));
    assert!(records.iter().any(|r| r.qualified_name == "Good.ok"));
    assert!(records.iter().any(|r| r.qualified_name == "Bad"));
}
