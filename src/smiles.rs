//! SMILES front end: a syntax-level validator for the OpenSMILES grammar and
//! the tokenizer used to build model inputs.
//!
//! The validator only checks that a string is a well-formed SMILES. It does
//! not perceive valence or aromaticity, so something like `C(C)(C)(C)(C)C`
//! passes here even though no toolkit would sanitize it.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SmilesError {
    #[error("empty SMILES")]
    Empty,

    #[error("unexpected character {ch:?} at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("unknown element `{symbol}` at position {pos}")]
    UnknownElement { symbol: String, pos: usize },

    #[error("unterminated bracket atom starting at position {0}")]
    UnclosedBracket(usize),

    #[error("`{token}` at position {pos} does not follow an atom")]
    Misplaced { token: char, pos: usize },

    #[error("unmatched `)` at position {0}")]
    UnbalancedBranch(usize),

    #[error("empty branch at position {0}")]
    EmptyBranch(usize),

    #[error("unclosed branch")]
    UnclosedBranch,

    #[error("bond at position {0} is not followed by an atom")]
    DanglingBond(usize),

    #[error("ring bond {0} is never closed")]
    UnclosedRing(u32),

    #[error("ring bond {ring} at position {pos} closes on its own atom")]
    SelfRing { ring: u32, pos: usize },

    #[error("conflicting bond orders for ring bond {0}")]
    RingBondMismatch(u32),
}

/// Element symbols allowed inside bracket atoms.
const ELEMENTS: [&str; 118] = [
    "H", "He", "Li", "Be", "B", "C", "N", "O", "F", "Ne", "Na", "Mg", "Al",
    "Si", "P", "S", "Cl", "Ar", "K", "Ca", "Sc", "Ti", "V", "Cr", "Mn", "Fe",
    "Co", "Ni", "Cu", "Zn", "Ga", "Ge", "As", "Se", "Br", "Kr", "Rb", "Sr",
    "Y", "Zr", "Nb", "Mo", "Tc", "Ru", "Rh", "Pd", "Ag", "Cd", "In", "Sn",
    "Sb", "Te", "I", "Xe", "Cs", "Ba", "La", "Ce", "Pr", "Nd", "Pm", "Sm",
    "Eu", "Gd", "Tb", "Dy", "Ho", "Er", "Tm", "Yb", "Lu", "Hf", "Ta", "W",
    "Re", "Os", "Ir", "Pt", "Au", "Hg", "Tl", "Pb", "Bi", "Po", "At", "Rn",
    "Fr", "Ra", "Ac", "Th", "Pa", "U", "Np", "Pu", "Am", "Cm", "Bk", "Cf",
    "Es", "Fm", "Md", "No", "Lr", "Rf", "Db", "Sg", "Bh", "Hs", "Mt", "Ds",
    "Rg", "Cn", "Nh", "Fl", "Mc", "Lv", "Ts", "Og",
];

/// Aromatic symbols allowed inside bracket atoms.
const AROMATIC: [&str; 9] = ["b", "c", "n", "o", "p", "s", "se", "as", "te"];

const CHIRAL_CLASSES: [&str; 5] = ["TH", "AL", "SP", "TB", "OH"];

const BONDS: &str = "-=#$:/\\";

/// Validate `smiles` against the OpenSMILES grammar.
pub fn validate(smiles: &str) -> Result<(), SmilesError> {
    Validator::new(smiles).run()
}

struct Validator {
    chars: Vec<char>,
    pos: usize,
    /// number of atoms seen so far, doubling as the index of the next atom
    atoms: usize,
    /// the atom new bonds attach to, if any
    current: Option<usize>,
    /// position of a bond symbol still waiting for its second atom
    pending_bond: Option<(usize, char)>,
    /// for each open branch: the atom it hangs off, the atom count at the
    /// opening parenthesis, and the position of that parenthesis
    branches: Vec<(usize, usize, usize)>,
    /// open ring bond number -> (atom, bond symbol)
    rings: HashMap<u32, (usize, Option<char>)>,
}

impl Validator {
    fn new(smiles: &str) -> Self {
        Self {
            chars: smiles.chars().collect(),
            pos: 0,
            atoms: 0,
            current: None,
            pending_bond: None,
            branches: Vec::new(),
            rings: HashMap::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn run(mut self) -> Result<(), SmilesError> {
        if self.chars.is_empty() {
            return Err(SmilesError::Empty);
        }
        while let Some(c) = self.peek() {
            match c {
                '(' => self.open_branch()?,
                ')' => self.close_branch()?,
                '.' => {
                    self.require_atom(c)?;
                    self.current = None;
                    self.pos += 1;
                }
                c if BONDS.contains(c) => {
                    self.require_atom(c)?;
                    self.pending_bond = Some((self.pos, c));
                    self.pos += 1;
                }
                '0'..='9' | '%' => self.ring_bond()?,
                '[' => self.bracket_atom()?,
                _ => self.organic_atom()?,
            }
        }
        if let Some((pos, _)) = self.pending_bond {
            return Err(SmilesError::DanglingBond(pos));
        }
        if !self.branches.is_empty() {
            return Err(SmilesError::UnclosedBranch);
        }
        if let Some(ring) = self.rings.keys().min() {
            return Err(SmilesError::UnclosedRing(*ring));
        }
        if self.current.is_none() {
            // either no atoms at all or a trailing '.'
            return Err(match self.atoms {
                0 => SmilesError::Empty,
                _ => SmilesError::Misplaced {
                    token: '.',
                    pos: self.chars.len() - 1,
                },
            });
        }
        Ok(())
    }

    /// `token` needs a preceding atom and must not follow a bare bond.
    /// returns that atom
    fn require_atom(&self, token: char) -> Result<usize, SmilesError> {
        let Some(atom) = self.current else {
            return Err(SmilesError::Misplaced {
                token,
                pos: self.pos,
            });
        };
        if let Some((pos, _)) = self.pending_bond {
            return Err(SmilesError::DanglingBond(pos));
        }
        Ok(atom)
    }

    fn open_branch(&mut self) -> Result<(), SmilesError> {
        let anchor = self.require_atom('(')?;
        self.branches.push((anchor, self.atoms, self.pos));
        self.pos += 1;
        Ok(())
    }

    fn close_branch(&mut self) -> Result<(), SmilesError> {
        let Some((anchor, atoms, open)) = self.branches.pop() else {
            return Err(SmilesError::UnbalancedBranch(self.pos));
        };
        if let Some((pos, _)) = self.pending_bond {
            return Err(SmilesError::DanglingBond(pos));
        }
        if self.atoms == atoms {
            return Err(SmilesError::EmptyBranch(open));
        }
        self.current = Some(anchor);
        self.pos += 1;
        Ok(())
    }

    fn ring_bond(&mut self) -> Result<(), SmilesError> {
        let start = self.pos;
        let Some(atom) = self.current else {
            return Err(SmilesError::Misplaced {
                token: self.chars[start],
                pos: start,
            });
        };
        let ring = if self.chars[start] == '%' {
            let digits: String =
                self.chars.iter().skip(start + 1).take(2).collect();
            if digits.len() != 2 || !digits.chars().all(|c| c.is_ascii_digit())
            {
                return Err(SmilesError::UnexpectedChar {
                    ch: '%',
                    pos: start,
                });
            }
            self.pos += 3;
            digits.parse().unwrap_or_default()
        } else {
            self.pos += 1;
            self.chars[start].to_digit(10).unwrap_or_default()
        };
        let bond = self.pending_bond.take().map(|(_, b)| b);
        match self.rings.remove(&ring) {
            Some((other, _)) if other == atom => {
                Err(SmilesError::SelfRing { ring, pos: start })
            }
            Some((_, Some(open))) if bond.is_some_and(|b| b != open) => {
                Err(SmilesError::RingBondMismatch(ring))
            }
            Some(_) => Ok(()),
            None => {
                self.rings.insert(ring, (atom, bond));
                Ok(())
            }
        }
    }

    fn add_atom(&mut self) {
        self.current = Some(self.atoms);
        self.atoms += 1;
        self.pending_bond = None;
    }

    fn organic_atom(&mut self) -> Result<(), SmilesError> {
        let c = self.chars[self.pos];
        let next = self.chars.get(self.pos + 1).copied();
        let len = match (c, next) {
            ('B', Some('r')) | ('C', Some('l')) => 2,
            ('B' | 'C' | 'N' | 'O' | 'P' | 'S' | 'F' | 'I', _) => 1,
            ('b' | 'c' | 'n' | 'o' | 'p' | 's' | '*', _) => 1,
            _ => {
                return Err(SmilesError::UnexpectedChar { ch: c, pos: self.pos })
            }
        };
        self.pos += len;
        self.add_atom();
        Ok(())
    }

    /// `[` isotope? symbol chiral? hcount? charge? class? `]`
    fn bracket_atom(&mut self) -> Result<(), SmilesError> {
        let open = self.pos;
        self.pos += 1;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }

        self.bracket_symbol(open)?;

        // chirality: @, @@, or @TH1-style classes
        if self.peek() == Some('@') {
            self.pos += 1;
            let class: String =
                self.chars.iter().skip(self.pos).take(2).collect();
            if self.peek() == Some('@') {
                self.pos += 1;
            } else if CHIRAL_CLASSES.contains(&class.as_str()) {
                self.pos += 2;
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1;
                }
            }
        }

        if self.peek() == Some('H') {
            self.pos += 1;
            if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        }

        if let Some(sign @ ('+' | '-')) = self.peek() {
            self.pos += 1;
            if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1;
                }
            } else {
                while self.peek() == Some(sign) {
                    self.pos += 1;
                }
            }
        }

        if self.peek() == Some(':') {
            self.pos += 1;
            if !self.peek().is_some_and(|c| c.is_ascii_digit()) {
                return Err(SmilesError::UnclosedBracket(open));
            }
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        }

        match self.peek() {
            Some(']') => {
                self.pos += 1;
                self.add_atom();
                Ok(())
            }
            Some(ch) if self.chars[self.pos..].contains(&']') => {
                Err(SmilesError::UnexpectedChar { ch, pos: self.pos })
            }
            _ => Err(SmilesError::UnclosedBracket(open)),
        }
    }

    fn bracket_symbol(&mut self, open: usize) -> Result<(), SmilesError> {
        let start = self.pos;
        let Some(first) = self.peek() else {
            return Err(SmilesError::UnclosedBracket(open));
        };
        if first == '*' {
            self.pos += 1;
            return Ok(());
        }
        let two: String = self.chars.iter().skip(start).take(2).collect();
        let one = first.to_string();
        let known = |s: &str| ELEMENTS.contains(&s) || AROMATIC.contains(&s);
        if two.chars().count() == 2 && known(&two) {
            self.pos += 2;
        } else if known(&one) {
            self.pos += 1;
        } else if first.is_ascii_alphabetic() {
            let symbol = match two.chars().nth(1) {
                Some(c) if c.is_ascii_lowercase() => two,
                _ => one,
            };
            return Err(SmilesError::UnknownElement { symbol, pos: start });
        } else {
            return Err(SmilesError::UnexpectedChar {
                ch: first,
                pos: start,
            });
        }
        Ok(())
    }
}

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"Br|Cl|[A-Za-z]|[\[\]()=#$:/\\@+\-.%*~?>]|[0-9]")
            .expect("token pattern is valid")
    })
}

/// Split `smiles` into model tokens: `Br` and `Cl` are kept whole, everything
/// else is a single character. Characters outside the token alphabet are an
/// error rather than being skipped.
pub fn tokenize(smiles: &str) -> Result<Vec<&str>, SmilesError> {
    let mut tokens = Vec::new();
    let mut end = 0;
    for m in token_regex().find_iter(smiles) {
        if m.start() != end {
            return Err(unexpected(smiles, end));
        }
        tokens.push(m.as_str());
        end = m.end();
    }
    if end != smiles.len() {
        return Err(unexpected(smiles, end));
    }
    Ok(tokens)
}

fn unexpected(smiles: &str, byte: usize) -> SmilesError {
    SmilesError::UnexpectedChar {
        ch: smiles[byte..].chars().next().unwrap_or_default(),
        pos: smiles[..byte].chars().count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_drug_like() {
        for smiles in [
            "CCO",
            "CC(=O)O",
            "c1ccccc1",
            "CC(=O)Oc1ccccc1C(=O)O",
            "CN1C=NC2=C1C(=O)N(C(=O)N2C)C",
            "C[C@@H](C(=O)O)N",
            "N[C@H](C)C(=O)O",
            "F[C@TH1](Cl)(Br)I",
            "[NH4+].[Cl-]",
            "F/C=C/F",
            "C%10CCCCC%10",
            "[13CH4]",
            "c1ccc2c(c1)[nH]c1ccccc12",
            "O=S(=O)([O-])c1ccccc1",
            "[Fe+++]",
            "C1CC2CCC1C2",
            "[2H]C([2H])([2H])Cl",
            "[CH3:1][OH:2]",
        ] {
            assert_eq!(validate(smiles), Ok(()), "{smiles}");
        }
    }

    #[test]
    fn syntax_only() {
        // well-formed strings that no toolkit would sanitize: an aromatic
        // ring that can't be kekulized and a pentavalent carbon
        for smiles in ["c1cccc1", "C(C)(C)(C)(C)C", "[C+5]", "n1nnnn1"] {
            assert_eq!(validate(smiles), Ok(()), "{smiles}");
        }
    }

    #[test]
    fn rejects_malformed() {
        let cases = [
            ("", SmilesError::Empty),
            (
                "not_a_molecule",
                SmilesError::UnexpectedChar { ch: 't', pos: 2 },
            ),
            ("C(C", SmilesError::UnclosedBranch),
            ("CC)", SmilesError::UnbalancedBranch(2)),
            ("C()C", SmilesError::EmptyBranch(1)),
            ("C1CC", SmilesError::UnclosedRing(1)),
            ("C11", SmilesError::SelfRing { ring: 1, pos: 2 }),
            ("CC=", SmilesError::DanglingBond(2)),
            ("=CC", SmilesError::Misplaced { token: '=', pos: 0 }),
            ("(C)C", SmilesError::Misplaced { token: '(', pos: 0 }),
            ("1CC1", SmilesError::Misplaced { token: '1', pos: 0 }),
            ("CC.", SmilesError::Misplaced { token: '.', pos: 2 }),
            ("[Xx]", SmilesError::UnknownElement {
                symbol: "Xx".to_owned(),
                pos: 1,
            }),
            ("C[NH4", SmilesError::UnclosedBracket(1)),
            ("C=1CC-1", SmilesError::RingBondMismatch(1)),
        ];
        for (smiles, want) in cases {
            assert_eq!(validate(smiles), Err(want), "{smiles}");
        }
    }

    #[test]
    fn tokenize_splits_halogens() {
        let got = tokenize("ClC(Br)c1ccccc1[NH4+]").unwrap();
        let want = vec![
            "Cl", "C", "(", "Br", ")", "c", "1", "c", "c", "c", "c", "c", "1",
            "[", "N", "H", "4", "+", "]",
        ];
        assert_eq!(got, want);
        assert_eq!(got.concat(), "ClC(Br)c1ccccc1[NH4+]");
    }

    #[test]
    fn tokenize_rejects_stray_characters() {
        assert_eq!(
            tokenize("CC O"),
            Err(SmilesError::UnexpectedChar { ch: ' ', pos: 2 })
        );
        assert_eq!(
            tokenize("CC_"),
            Err(SmilesError::UnexpectedChar { ch: '_', pos: 2 })
        );
        assert_eq!(tokenize(""), Ok(vec![]));
    }
}
