//! The catalogue of currencies that can be chosen as the alternate display currency.

/// The currency every statement amount is denominated in.
pub const BASE_CURRENCY: &str = "USD";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Currency {
    pub code: &'static str,
    pub name: &'static str,
    pub symbol: Option<&'static str>,
}

/// Every supported currency, sorted by code.
pub fn all() -> &'static [Currency] {
    CURRENCIES
}

pub fn find(code: &str) -> Option<&'static Currency> {
    CURRENCIES
        .binary_search_by(|c| c.code.cmp(code))
        .ok()
        .map(|i| &CURRENCIES[i])
}

pub fn is_known(code: &str) -> bool {
    find(code).is_some()
}

/// The display symbol of `code`, if it has one.
pub fn symbol(code: &str) -> Option<&'static str> {
    find(code).and_then(|c| c.symbol)
}

const CURRENCIES: &[Currency] = &[
    Currency {
        code: "AED",
        name: "United Arab Emirates Dirham",
        symbol: None,
    },
    Currency {
        code: "AFN",
        name: "Afghan Afghani",
        symbol: Some("؋"),
    },
    Currency {
        code: "ALL",
        name: "Albanian Lek",
        symbol: None,
    },
    Currency {
        code: "AMD",
        name: "Armenian Dram",
        symbol: None,
    },
    Currency {
        code: "ANG",
        name: "Netherlands Antillean Guilder",
        symbol: Some("ƒ"),
    },
    Currency {
        code: "AOA",
        name: "Angolan Kwanza",
        symbol: None,
    },
    Currency {
        code: "ARS",
        name: "Argentine Peso",
        symbol: Some("$"),
    },
    Currency {
        code: "AUD",
        name: "Australian Dollar",
        symbol: Some("$"),
    },
    Currency {
        code: "AWG",
        name: "Aruban Florin",
        symbol: Some("ƒ"),
    },
    Currency {
        code: "AZN",
        name: "Azerbaijani Manat",
        symbol: Some("ман"),
    },
    Currency {
        code: "BAM",
        name: "Bosnia-Herzegovina Convertible Mark",
        symbol: Some("KM"),
    },
    Currency {
        code: "BBD",
        name: "Barbadian Dollar",
        symbol: Some("$"),
    },
    Currency {
        code: "BDT",
        name: "Bangladeshi Taka",
        symbol: None,
    },
    Currency {
        code: "BGN",
        name: "Bulgarian Lev",
        symbol: Some("лв"),
    },
    Currency {
        code: "BHD",
        name: "Bahraini Dinar",
        symbol: None,
    },
    Currency {
        code: "BIF",
        name: "Burundian Franc",
        symbol: None,
    },
    Currency {
        code: "BMD",
        name: "Bermudan Dollar",
        symbol: Some("$"),
    },
    Currency {
        code: "BND",
        name: "Brunei Dollar",
        symbol: Some("$"),
    },
    Currency {
        code: "BOB",
        name: "Bolivian Boliviano",
        symbol: Some("$b"),
    },
    Currency {
        code: "BRL",
        name: "Brazilian Real",
        symbol: Some("R$"),
    },
    Currency {
        code: "BSD",
        name: "Bahamian Dollar",
        symbol: Some("$"),
    },
    Currency {
        code: "BTN",
        name: "Bhutanese Ngultrum",
        symbol: None,
    },
    Currency {
        code: "BWP",
        name: "Botswanan Pula",
        symbol: Some("P"),
    },
    Currency {
        code: "BYR",
        name: "Belarusian Ruble",
        symbol: Some("p."),
    },
    Currency {
        code: "BZD",
        name: "Belize Dollar",
        symbol: Some("BZ$"),
    },
    Currency {
        code: "CAD",
        name: "Canadian Dollar",
        symbol: Some("$"),
    },
    Currency {
        code: "CDF",
        name: "Congolese Franc",
        symbol: None,
    },
    Currency {
        code: "CHF",
        name: "Swiss Franc",
        symbol: None,
    },
    Currency {
        code: "CLF",
        name: "Chilean Unit of Account (UF)",
        symbol: None,
    },
    Currency {
        code: "CLP",
        name: "Chilean Peso",
        symbol: Some("$"),
    },
    Currency {
        code: "CNY",
        name: "Chinese Yuan",
        symbol: Some("¥"),
    },
    Currency {
        code: "COP",
        name: "Colombian Peso",
        symbol: Some("$"),
    },
    Currency {
        code: "CRC",
        name: "Costa Rican Colón",
        symbol: Some("₡"),
    },
    Currency {
        code: "CUP",
        name: "Cuban Peso",
        symbol: Some("₱"),
    },
    Currency {
        code: "CVE",
        name: "Cape Verdean Escudo",
        symbol: None,
    },
    Currency {
        code: "CZK",
        name: "Czech Republic Koruna",
        symbol: Some("Kč"),
    },
    Currency {
        code: "DJF",
        name: "Djiboutian Franc",
        symbol: None,
    },
    Currency {
        code: "DKK",
        name: "Danish Krone",
        symbol: Some("kr"),
    },
    Currency {
        code: "DOP",
        name: "Dominican Peso",
        symbol: Some("RD$"),
    },
    Currency {
        code: "DZD",
        name: "Algerian Dinar",
        symbol: None,
    },
    Currency {
        code: "EGP",
        name: "Egyptian Pound",
        symbol: Some("£"),
    },
    Currency {
        code: "ETB",
        name: "Ethiopian Birr",
        symbol: None,
    },
    Currency {
        code: "EUR",
        name: "Euro",
        symbol: Some("€"),
    },
    Currency {
        code: "FJD",
        name: "Fijian Dollar",
        symbol: Some("$"),
    },
    Currency {
        code: "FKP",
        name: "Falkland Islands Pound",
        symbol: Some("£"),
    },
    Currency {
        code: "GBP",
        name: "British Pound Sterling",
        symbol: Some("£"),
    },
    Currency {
        code: "GEL",
        name: "Georgian Lari",
        symbol: None,
    },
    Currency {
        code: "GHS",
        name: "Ghanaian Cedi",
        symbol: None,
    },
    Currency {
        code: "GIP",
        name: "Gibraltar Pound",
        symbol: Some("£"),
    },
    Currency {
        code: "GMD",
        name: "Gambian Dalasi",
        symbol: None,
    },
    Currency {
        code: "GNF",
        name: "Guinean Franc",
        symbol: None,
    },
    Currency {
        code: "GTQ",
        name: "Guatemalan Quetzal",
        symbol: Some("Q"),
    },
    Currency {
        code: "GYD",
        name: "Guyanaese Dollar",
        symbol: Some("$"),
    },
    Currency {
        code: "HKD",
        name: "Hong Kong Dollar",
        symbol: Some("$"),
    },
    Currency {
        code: "HNL",
        name: "Honduran Lempira",
        symbol: Some("L"),
    },
    Currency {
        code: "HRK",
        name: "Croatian Kuna",
        symbol: Some("kn"),
    },
    Currency {
        code: "HTG",
        name: "Haitian Gourde",
        symbol: None,
    },
    Currency {
        code: "HUF",
        name: "Hungarian Forint",
        symbol: Some("Ft"),
    },
    Currency {
        code: "IDR",
        name: "Indonesian Rupiah",
        symbol: Some("Rp"),
    },
    Currency {
        code: "ILS",
        name: "Israeli New Sheqel",
        symbol: Some("₪"),
    },
    Currency {
        code: "INR",
        name: "Indian Rupee",
        symbol: Some("₹"),
    },
    Currency {
        code: "IQD",
        name: "Iraqi Dinar",
        symbol: None,
    },
    Currency {
        code: "IRR",
        name: "Iranian Rial",
        symbol: Some("﷼"),
    },
    Currency {
        code: "ISK",
        name: "Icelandic Króna",
        symbol: Some("kr"),
    },
    Currency {
        code: "JMD",
        name: "Jamaican Dollar",
        symbol: Some("J$"),
    },
    Currency {
        code: "JOD",
        name: "Jordanian Dinar",
        symbol: None,
    },
    Currency {
        code: "JPY",
        name: "Japanese Yen",
        symbol: Some("¥"),
    },
    Currency {
        code: "KES",
        name: "Kenyan Shilling",
        symbol: None,
    },
    Currency {
        code: "KGS",
        name: "Kyrgystani Som",
        symbol: Some("лв"),
    },
    Currency {
        code: "KHR",
        name: "Cambodian Riel",
        symbol: Some("៛"),
    },
    Currency {
        code: "KMF",
        name: "Comorian Franc",
        symbol: None,
    },
    Currency {
        code: "KPW",
        name: "North Korean Won",
        symbol: Some("₩"),
    },
    Currency {
        code: "KRW",
        name: "South Korean Won",
        symbol: Some("₩"),
    },
    Currency {
        code: "KWD",
        name: "Kuwaiti Dinar",
        symbol: None,
    },
    Currency {
        code: "KZT",
        name: "Kazakhstani Tenge",
        symbol: Some("лв"),
    },
    Currency {
        code: "LAK",
        name: "Laotian Kip",
        symbol: Some("₭"),
    },
    Currency {
        code: "LBP",
        name: "Lebanese Pound",
        symbol: Some("£"),
    },
    Currency {
        code: "LKR",
        name: "Sri Lankan Rupee",
        symbol: Some("₨"),
    },
    Currency {
        code: "LRD",
        name: "Liberian Dollar",
        symbol: Some("$"),
    },
    Currency {
        code: "LSL",
        name: "Lesotho Loti",
        symbol: None,
    },
    Currency {
        code: "LTL",
        name: "Lithuanian Litas",
        symbol: Some("Lt"),
    },
    Currency {
        code: "LVL",
        name: "Latvian Lats",
        symbol: Some("Ls"),
    },
    Currency {
        code: "LYD",
        name: "Libyan Dinar",
        symbol: None,
    },
    Currency {
        code: "MAD",
        name: "Moroccan Dirham",
        symbol: None,
    },
    Currency {
        code: "MDL",
        name: "Moldovan Leu",
        symbol: None,
    },
    Currency {
        code: "MGA",
        name: "Malagasy Ariary",
        symbol: None,
    },
    Currency {
        code: "MKD",
        name: "Macedonian Denar",
        symbol: Some("ден"),
    },
    Currency {
        code: "MMK",
        name: "Myanma Kyat",
        symbol: None,
    },
    Currency {
        code: "MNT",
        name: "Mongolian Tugrik",
        symbol: Some("₮"),
    },
    Currency {
        code: "MOP",
        name: "Macanese Pataca",
        symbol: None,
    },
    Currency {
        code: "MRO",
        name: "Mauritanian Ouguiya",
        symbol: None,
    },
    Currency {
        code: "MUR",
        name: "Mauritian Rupee",
        symbol: Some("₨"),
    },
    Currency {
        code: "MVR",
        name: "Maldivian Rufiyaa",
        symbol: None,
    },
    Currency {
        code: "MWK",
        name: "Malawian Kwacha",
        symbol: None,
    },
    Currency {
        code: "MXN",
        name: "Mexican Peso",
        symbol: Some("$"),
    },
    Currency {
        code: "MYR",
        name: "Malaysian Ringgit",
        symbol: Some("RM"),
    },
    Currency {
        code: "MZN",
        name: "Mozambican Metical",
        symbol: Some("MT"),
    },
    Currency {
        code: "NAD",
        name: "Namibian Dollar",
        symbol: Some("$"),
    },
    Currency {
        code: "NGN",
        name: "Nigerian Naira",
        symbol: Some("₦"),
    },
    Currency {
        code: "NIO",
        name: "Nicaraguan Córdoba",
        symbol: Some("C$"),
    },
    Currency {
        code: "NOK",
        name: "Norwegian Krone",
        symbol: Some("kr"),
    },
    Currency {
        code: "NPR",
        name: "Nepalese Rupee",
        symbol: Some("₨"),
    },
    Currency {
        code: "NZD",
        name: "New Zealand Dollar",
        symbol: Some("$"),
    },
    Currency {
        code: "OMR",
        name: "Omani Rial",
        symbol: Some("﷼"),
    },
    Currency {
        code: "PAB",
        name: "Panamanian Balboa",
        symbol: Some("B/."),
    },
    Currency {
        code: "PEN",
        name: "Peruvian Nuevo Sol",
        symbol: Some("S/."),
    },
    Currency {
        code: "PGK",
        name: "Papua New Guinean Kina",
        symbol: None,
    },
    Currency {
        code: "PHP",
        name: "Philippine Peso",
        symbol: Some("₱"),
    },
    Currency {
        code: "PKR",
        name: "Pakistani Rupee",
        symbol: Some("₨"),
    },
    Currency {
        code: "PLN",
        name: "Polish Zloty",
        symbol: Some("zł"),
    },
    Currency {
        code: "PYG",
        name: "Paraguayan Guarani",
        symbol: Some("Gs"),
    },
    Currency {
        code: "QAR",
        name: "Qatari Rial",
        symbol: Some("﷼"),
    },
    Currency {
        code: "RON",
        name: "Romanian Leu",
        symbol: None,
    },
    Currency {
        code: "RSD",
        name: "Serbian Dinar",
        symbol: Some("Дин."),
    },
    Currency {
        code: "RUB",
        name: "Russian Ruble",
        symbol: Some("руб"),
    },
    Currency {
        code: "RWF",
        name: "Rwandan Franc",
        symbol: None,
    },
    Currency {
        code: "SAR",
        name: "Saudi Riyal",
        symbol: Some("﷼"),
    },
    Currency {
        code: "SBD",
        name: "Solomon Islands Dollar",
        symbol: Some("$"),
    },
    Currency {
        code: "SCR",
        name: "Seychellois Rupee",
        symbol: Some("₨"),
    },
    Currency {
        code: "SDG",
        name: "Sudanese Pound",
        symbol: None,
    },
    Currency {
        code: "SEK",
        name: "Swedish Krona",
        symbol: Some("kr"),
    },
    Currency {
        code: "SGD",
        name: "Singapore Dollar",
        symbol: Some("$"),
    },
    Currency {
        code: "SHP",
        name: "Saint Helena Pound",
        symbol: Some("£"),
    },
    Currency {
        code: "SLL",
        name: "Sierra Leonean Leone",
        symbol: None,
    },
    Currency {
        code: "SOS",
        name: "Somali Shilling",
        symbol: Some("S"),
    },
    Currency {
        code: "SRD",
        name: "Surinamese Dollar",
        symbol: Some("$"),
    },
    Currency {
        code: "STD",
        name: "São Tomé and Príncipe Dobra",
        symbol: None,
    },
    Currency {
        code: "SVC",
        name: "Salvadoran Colón",
        symbol: Some("$"),
    },
    Currency {
        code: "SYP",
        name: "Syrian Pound",
        symbol: Some("£"),
    },
    Currency {
        code: "SZL",
        name: "Swazi Lilangeni",
        symbol: None,
    },
    Currency {
        code: "THB",
        name: "Thai Baht",
        symbol: Some("฿"),
    },
    Currency {
        code: "TJS",
        name: "Tajikistani Somoni",
        symbol: None,
    },
    Currency {
        code: "TMT",
        name: "Turkmenistani Manat",
        symbol: None,
    },
    Currency {
        code: "TND",
        name: "Tunisian Dinar",
        symbol: None,
    },
    Currency {
        code: "TOP",
        name: "Tongan Paʻanga",
        symbol: None,
    },
    Currency {
        code: "TRY",
        name: "Turkish Lira",
        symbol: None,
    },
    Currency {
        code: "TTD",
        name: "Trinidad and Tobago Dollar",
        symbol: Some("TT$"),
    },
    Currency {
        code: "TWD",
        name: "New Taiwan Dollar",
        symbol: Some("NT$"),
    },
    Currency {
        code: "TZS",
        name: "Tanzanian Shilling",
        symbol: None,
    },
    Currency {
        code: "UAH",
        name: "Ukrainian Hryvnia",
        symbol: Some("₴"),
    },
    Currency {
        code: "UGX",
        name: "Ugandan Shilling",
        symbol: None,
    },
    Currency {
        code: "USD",
        name: "United States Dollar",
        symbol: Some("$"),
    },
    Currency {
        code: "UYU",
        name: "Uruguayan Peso",
        symbol: Some("$U"),
    },
    Currency {
        code: "UZS",
        name: "Uzbekistan Som",
        symbol: Some("лв"),
    },
    Currency {
        code: "VEF",
        name: "Venezuelan Bolívar",
        symbol: Some("Bs"),
    },
    Currency {
        code: "VND",
        name: "Vietnamese Dong",
        symbol: Some("₫"),
    },
    Currency {
        code: "VUV",
        name: "Vanuatu Vatu",
        symbol: None,
    },
    Currency {
        code: "WST",
        name: "Samoan Tala",
        symbol: None,
    },
    Currency {
        code: "XAF",
        name: "CFA Franc BEAC",
        symbol: None,
    },
    Currency {
        code: "XCD",
        name: "East Caribbean Dollar",
        symbol: Some("$"),
    },
    Currency {
        code: "XDR",
        name: "Special Drawing Rights",
        symbol: None,
    },
    Currency {
        code: "XOF",
        name: "CFA Franc BCEAO",
        symbol: None,
    },
    Currency {
        code: "XPF",
        name: "CFP Franc",
        symbol: None,
    },
    Currency {
        code: "YER",
        name: "Yemeni Rial",
        symbol: Some("﷼"),
    },
    Currency {
        code: "ZAR",
        name: "South African Rand",
        symbol: Some("R"),
    },
    Currency {
        code: "ZMK",
        name: "Zambian Kwacha",
        symbol: None,
    },
    Currency {
        code: "ZWL",
        name: "Zimbabwean Dollar",
        symbol: None,
    },
];
