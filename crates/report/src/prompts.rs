//! Prompt construction for reports and analyses

use redops_common::{Finding, ReportKind, Target};

/// Findings embedded in a report prompt, at most.
pub const MAX_REPORT_FINDINGS: usize = 20;

fn kind_instructions(kind: ReportKind) -> &'static str {
    match kind {
        ReportKind::Executive => "Focus on business risk, financial impact, and strategic roadmap. \
            Use non-technical language where possible. Highlight immediate threats to reputation and data.",
        ReportKind::Technical => "Focus on reproduction steps, specific CVEs, CVSS vectors, and \
            code-level remediation. Include command-line examples for verification.",
        ReportKind::Compliance => "Map findings to ISO 27001, SOC2, and GDPR controls. Highlight \
            compliance violations and necessary policy updates.",
    }
}

/// Human title for a report, e.g. `corp.example.com - Technical Report`.
pub fn report_title(domain: &str, kind: ReportKind) -> String {
    let name = match kind {
        ReportKind::Executive => "Executive",
        ReportKind::Technical => "Technical",
        ReportKind::Compliance => "Compliance",
    };
    format!("{} - {} Report", domain, name)
}

/// Risk report prompt for one target.
pub fn report_prompt(target: &Target, findings: &[Finding], kind: ReportKind) -> String {
    let embedded = &findings[..findings.len().min(MAX_REPORT_FINDINGS)];
    let findings_json = serde_json::to_string(embedded).unwrap_or_else(|_| "[]".to_string());
    let closing_section = match kind {
        ReportKind::Executive => "Budget & Timeline",
        _ => "Verification Steps",
    };

    format!(
        "Act as a Senior Principal Security Architect and Technical Writer.\n\n\
         Target: {domain}\n\
         Risk Score: {score}/100\n\
         Report Type: {kind}\n\n\
         Findings Data (JSON):\n{findings}\n\n\
         Generate a professional {lower} security report.\n\n\
         {instructions}\n\n\
         Structure:\n\
         1. Title & Date\n\
         2. Summary\n\
         3. Critical Findings (if any)\n\
         4. Remediation Plan\n\
         5. {closing}\n\n\
         Format as clean Markdown.\n",
        domain = target.domain,
        score = target.risk_score,
        kind = kind,
        findings = findings_json,
        lower = kind.as_str().to_lowercase(),
        instructions = kind_instructions(kind),
        closing = closing_section,
    )
}

/// Prompt explaining a single finding.
pub fn finding_prompt(finding: &Finding) -> String {
    format!(
        "Analyze this specific vulnerability finding:\n\
         Tool: {}\n\
         Title: {}\n\
         Description: {}\n\n\
         Provide:\n\
         1. A technical explanation of why this is dangerous.\n\
         2. A specific 'gcloud' or 'bash' command to verify it manually (if applicable) or a curl command.\n\
         3. A concise remediation step for a DevOps engineer.\n",
        finding.tool, finding.title, finding.description
    )
}

/// Prompt triaging raw output of a security tool.
pub fn tool_output_prompt(raw_output: &str, tool: &str) -> String {
    format!(
        r#"Act as a Senior Lead Security Engineer and DevSecOps Architect.
Analyze the following raw output from the security tool "{tool}".

Raw Output:
{raw_output}

Provide a detailed analysis in Markdown format:

### 1. Classification
- **Vulnerability Category**: Determine the specific category (e.g., SQL Injection, XSS, Misconfiguration, Sensitive Data Exposure, Vulnerable Component).
- **Severity Assessment**: Critical/High/Medium/Low with justification.

### 2. Executive Summary
Concise summary of what was found.

### 3. Risk Assessment
- **Impact**: Potential consequences.
- **Likelihood**: Probability of exploitation.
- **False Positive Confidence**: (Low/Medium/High) with reasoning.

### 4. Technical Deep Dive
Explain the vulnerability or finding in technical depth. Why is this specific output concerning?

### 5. Mitigation & Remediation (Step-by-Step)
Provide detailed, copy-pasteable instructions for remediation.
- **Configuration Changes**: Show the specific config lines (e.g., Nginx, Apache, AWS Security Groups).
- **Commands**: Provide bash/CLI commands to fix or verify the fix.
- **Code Patches**: If applicable, show code snippets (e.g., Python, Go, Node.js) to sanitize input or fix logic.

### 6. Validation
How to verify the fix using {tool} or other standard tools (curl, etc).
"#
    )
}

/// Tool-style console output reconstructed from a stored finding.
pub fn simulated_tool_output(finding: &Finding, domain: &str) -> String {
    let mut out = format!(
        "Tool: {}\nScan ID: VULN-{}\nTimestamp: {}\n[+] Target: {}\n[!] Vulnerability Detected: {}\n[>] Severity: {}\n",
        finding.tool,
        finding.id.to_uppercase(),
        finding.timestamp,
        domain,
        finding.title,
        finding.severity,
    );
    if let Some(cvss) = finding.cvss_score {
        out.push_str(&format!("[>] CVSS: {:.1}\n", cvss));
    }
    if let Some(category) = &finding.category {
        out.push_str(&format!("[>] Category: {}\n", category));
    }
    out.push_str(&format!("\nDescription:\n{}\n", finding.description));
    out
}
