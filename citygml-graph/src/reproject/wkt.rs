//! Reprojection d'un `MULTIPOLYGON` WKT, texte en entrée comme en sortie
//!
//! Les anneaux sont repérés par les délimiteurs littéraux `((` et `))`. Chaque
//! jeton `x y` est transformé vers le système cible puis réécrit avec sa
//! précision fixe. L'ordre et le nombre d'anneaux et de points sont conservés.

use memchr::memmem;

use super::{Geographic, ReprojectError, SmartProjection, SourceProjection, TargetSystem};

/// Reprojecteur WKT : une projection source, un système cible partagé
pub struct WktReprojector<'t, P = SmartProjection> {
    source: P,
    target: &'t TargetSystem,
}

impl<'t> WktReprojector<'t, SmartProjection> {
    /// Construit le reprojecteur depuis un identifiant de CRS
    ///
    /// Un identifiant illisible ou non supporté échoue ici, avant toute géométrie.
    pub fn from_identifier(
        identifier: &str,
        target: &'t TargetSystem,
    ) -> Result<Self, ReprojectError> {
        Ok(Self::new(SmartProjection::from_identifier(identifier)?, target))
    }
}

impl<'t, P: SourceProjection> WktReprojector<'t, P> {
    pub fn new(source: P, target: &'t TargetSystem) -> Self {
        Self { source, target }
    }

    pub fn source(&self) -> &P {
        &self.source
    }

    /// Reprojette toutes les coordonnées d'un `MULTIPOLYGON`
    ///
    /// `MULTIPOLYGON()` et les anneaux dégénérés `(())` sont conservés tels quels.
    ///
    /// # Errors
    ///
    /// Le premier jeton invalide fait échouer toute la géométrie.
    pub fn reproject(&self, wkt: &str) -> Result<String, ReprojectError> {
        let body = multipolygon_body(wkt)?;

        let mut out = String::with_capacity(wkt.len() + wkt.len() / 2);
        out.push_str("MULTIPOLYGON(");

        let mut count = 0usize;
        for ring in ring_bodies(body) {
            let ring = ring?;
            if count > 0 {
                out.push_str(", ");
            }
            out.push_str("((");
            self.write_ring(&mut out, ring)?;
            out.push_str("))");
            count += 1;
        }

        if count == 0 && !body.trim().is_empty() {
            return Err(ReprojectError::MalformedWkt(format!(
                "no ring found in '{}'",
                body.trim()
            )));
        }

        out.push(')');
        Ok(out)
    }

    fn write_ring(&self, out: &mut String, ring: &str) -> Result<(), ReprojectError> {
        if ring.trim().is_empty() {
            return Ok(());
        }

        for (i, token) in ring.split(',').enumerate() {
            let geo = self.transform_token(token)?;
            if i > 0 {
                out.push_str(", ");
            }
            self.target.write_point(out, geo);
        }
        Ok(())
    }

    fn transform_token(&self, token: &str) -> Result<Geographic, ReprojectError> {
        let token = token.trim();
        let invalid = || ReprojectError::InvalidToken {
            token: token.to_string(),
        };

        let mut fields = token.split_whitespace();
        let (x, y) = match (fields.next(), fields.next(), fields.next()) {
            (Some(x), Some(y), None) => (parse_number(x), parse_number(y)),
            _ => return Err(invalid()),
        };
        let (Some(x), Some(y)) = (x, y) else {
            return Err(invalid());
        };

        let geo = self
            .source
            .to_geographic(x, y)
            .map_err(|e| ReprojectError::Transform {
                token: token.to_string(),
                reason: match e {
                    ReprojectError::Transform { reason, .. } => reason,
                    other => other.to_string(),
                },
            })?;

        if !geo.is_finite() {
            return Err(ReprojectError::Transform {
                token: token.to_string(),
                reason: "non-finite result".to_string(),
            });
        }

        Ok(geo)
    }
}

/// Contenu entre `MULTIPOLYGON(` et la parenthèse finale
fn multipolygon_body(wkt: &str) -> Result<&str, ReprojectError> {
    wkt.trim()
        .strip_prefix("MULTIPOLYGON")
        .map(str::trim_start)
        .and_then(|s| s.strip_prefix('('))
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| {
            let preview: String = wkt.chars().take(40).collect();
            ReprojectError::MalformedWkt(format!("expected MULTIPOLYGON(...), got '{}'", preview))
        })
}

/// Corps des anneaux d'un `MULTIPOLYGON`, dans l'ordre
///
/// # Errors
///
/// Même contrôle de structure que `WktReprojector::reproject`.
pub fn split_rings(wkt: &str) -> Result<Vec<&str>, ReprojectError> {
    ring_bodies(multipolygon_body(wkt)?).collect()
}

/// Corps des anneaux, entre `((` et le `))` suivant, parenthèses résiduelles retirées
///
/// Hors des anneaux, seuls les espaces et les virgules sont admis.
fn ring_bodies(body: &str) -> impl Iterator<Item = Result<&str, ReprojectError>> + '_ {
    let mut rest = Some(body);

    std::iter::from_fn(move || {
        let current = rest.take()?;
        let Some(open) = memmem::find(current.as_bytes(), b"((") else {
            return (!is_separator(current)).then(|| Err(stray_text(current)));
        };
        if !is_separator(&current[..open]) {
            return Some(Err(stray_text(&current[..open])));
        }

        let after_open = &current[open + 2..];
        match memmem::find(after_open.as_bytes(), b"))") {
            Some(close) => {
                let ring = &after_open[..close];
                rest = Some(&after_open[close + 2..]);
                Some(Ok(ring.trim_matches(|c: char| c == '(' || c == ')')))
            }
            None => Some(Err(ReprojectError::MalformedWkt(
                "ring opened with '((' is never closed".to_string(),
            ))),
        }
    })
}

fn is_separator(text: &str) -> bool {
    text.chars().all(|c| c.is_whitespace() || c == ',')
}

fn stray_text(text: &str) -> ReprojectError {
    let preview: String = text.trim().chars().take(40).collect();
    ReprojectError::MalformedWkt(format!("unexpected '{}' outside rings", preview))
}

/// Nombre fini, sinon `None`
fn parse_number(field: &str) -> Option<f64> {
    fast_float::parse::<f64, _>(field)
        .ok()
        .filter(|v| v.is_finite())
}
