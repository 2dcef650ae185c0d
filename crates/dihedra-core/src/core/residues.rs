use phf::{Map, phf_map};

static ONE_TO_THREE: Map<char, &'static str> = phf_map! {
    'A' => "ALA",
    'R' => "ARG",
    'N' => "ASN",
    'D' => "ASP",
    'C' => "CYS",
    'Q' => "GLN",
    'E' => "GLU",
    'G' => "GLY",
    'H' => "HIS",
    'I' => "ILE",
    'L' => "LEU",
    'K' => "LYS",
    'M' => "MET",
    'F' => "PHE",
    'P' => "PRO",
    'S' => "SER",
    'T' => "THR",
    'W' => "TRP",
    'Y' => "TYR",
    'V' => "VAL",
    // Unknown or non-standard residue, as emitted by most sequence extractors.
    'X' => "UNK",
};

#[inline]
pub fn is_residue_code(code: char) -> bool {
    ONE_TO_THREE.contains_key(&code)
}

#[inline]
pub fn three_letter_code(code: char) -> Option<&'static str> {
    ONE_TO_THREE.get(&code).copied()
}
